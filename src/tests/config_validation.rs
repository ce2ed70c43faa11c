//! Configuration loading and validation tests

#[cfg(test)]
mod config_validation {
    use crate::config::{Config, ProgramConfig, ENV_KEYPAIR, ENV_RPC_URL};
    use crate::id_pool::CorruptionPolicy;
    use crate::instructions::escrow::{ESCROW_PROGRAM_ID, PROTOCOL_FEE_WALLET};
    use crate::ledger::CommitmentLevel;
    use crate::workflow::Backoff;
    use solana_sdk::pubkey::Pubkey;
    use std::io::Write;
    use std::time::Duration;

    fn from_toml(body: &str) -> Config {
        toml::from_str(body).unwrap()
    }

    #[test]
    fn test_defaults_match_operational_constants() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.capacity, 1000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_ms, 3000);
        assert_eq!(config.mint.fee_amount, 5_000_000_000);
        assert_eq!(config.program.token_decimals, 9);
        assert_eq!(config.rpc.commitment, CommitmentLevel::Finalized);

        let settings = config.workflow_settings().unwrap();
        assert_eq!(settings.escrow_program, ESCROW_PROGRAM_ID);
        assert_eq!(settings.fee_sol_account, PROTOCOL_FEE_WALLET);
        assert_eq!(settings.retry.delay_for(1), Duration::from_secs(3));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = from_toml("");
        assert_eq!(config.pool.store_path.to_str(), Some("created_assets.json"));
        assert_eq!(config.mint.uri_prefix, "IKI_");
        assert_eq!(config.program.token_decimals, 9);
    }

    #[test]
    fn test_partial_file_keeps_token_decimals() {
        assert_eq!(ProgramConfig::default().token_decimals, 9);

        let config = from_toml("[rpc]\nendpoint = \"http://127.0.0.1:8899\"\n");
        assert_eq!(config.program.token_decimals, 9);

        let config = from_toml("[program]\ncollection = \"11111111111111111111111111111111\"\n");
        assert_eq!(config.program.token_decimals, 9);

        let config = from_toml("[program]\ntoken_decimals = 6\n");
        assert_eq!(config.program.token_decimals, 6);
    }

    #[test]
    fn test_paid_mint_needs_admin_recipient() {
        let payer = Pubkey::new_unique();
        let admin = Pubkey::new_unique();
        let mut config = Config::default();

        let err = config.paid_mint_recipient(&payer).unwrap_err().to_string();
        assert!(err.contains("mint.fee_recipient"), "{err}");

        config.mint.fee_recipient = Some(payer.to_string());
        assert!(config.paid_mint_recipient(&payer).is_err());

        config.mint.fee_recipient = Some(admin.to_string());
        assert_eq!(config.paid_mint_recipient(&payer).unwrap(), admin);

        // free mints need no recipient
        config.mint.fee_recipient = None;
        config.mint.fee_amount = 0;
        assert_eq!(config.paid_mint_recipient(&payer).unwrap(), payer);
    }

    #[test]
    fn test_sections_parse() {
        let config = from_toml(
            r#"
            [rpc]
            endpoint = "http://127.0.0.1:8899"
            commitment = "confirmed"

            [pool]
            store_path = "/var/lib/escrow/ids.json"
            capacity = 50
            reset_on_corrupt = true

            [retry]
            max_attempts = 8
            delay_ms = 500
            backoff = { kind = "exponential", max_delay_ms = 4000 }

            [mint]
            base_uri = "https://meta.example"
            fee_amount = 0
            "#,
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.commitment, CommitmentLevel::Confirmed);
        assert_eq!(config.retry.backoff, Backoff::Exponential { max_delay_ms: 4000 });

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 8);
        assert_eq!(policy.delay_for(4), Duration::from_millis(4000));

        assert_eq!(config.metadata_template().uri_for(9), "https://meta.example/IKI_9.json");
        let store = config.pool_store(false);
        assert_eq!(store.capacity(), 50);
    }

    #[test]
    fn test_corruption_policy_selection() {
        let mut config = Config::default();
        assert_eq!(config.pool_store(false).policy(), CorruptionPolicy::Abort);
        assert_eq!(config.pool_store(true).policy(), CorruptionPolicy::ResetToEmpty);
        config.pool.reset_on_corrupt = true;
        assert_eq!(config.pool_store(false).policy(), CorruptionPolicy::ResetToEmpty);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.pool.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.program.collection = Some("not-a-pubkey".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("program.collection"), "{err}");

        let mut config = Config::default();
        config.retry.backoff = Backoff::Exponential { max_delay_ms: 100 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_after_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rpc]\nendpoint = \"http://from-file\"").unwrap();

        std::env::set_var(ENV_RPC_URL, "http://from-env");
        std::env::set_var(ENV_KEYPAIR, "/tmp/payer.json");
        let config = Config::from_file_with_env(file.path().to_str().unwrap()).unwrap();
        std::env::remove_var(ENV_RPC_URL);
        std::env::remove_var(ENV_KEYPAIR);

        assert_eq!(config.rpc.endpoint, "http://from-env");
        assert_eq!(config.wallet.keypair_path, "/tmp/payer.json");
    }
}
