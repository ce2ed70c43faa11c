//! Asset program instructions and account views
//!
//! Instruction data is a one-byte discriminator followed by Borsh-encoded
//! arguments. Optional accounts that are not supplied are passed as the
//! program id itself.
//!
//! Collection accounts are laid out as the collection base, then (when any
//! plugin is attached) a plugin header pointing at the plugin registry.

use super::{InstructionBuildError, SYSTEM_PROGRAM_ID};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
};

pub const ASSET_PROGRAM_ID: Pubkey = pubkey!("CoREENxT6tW1HoK8ypY1SxRMZTcVPm7R94rH4PZNhX7d");

const CREATE_V1: u8 = 0;
const CREATE_COLLECTION_V1: u8 = 1;
const ADD_COLLECTION_PLUGIN_V1: u8 = 3;
const TRANSFER_V1: u8 = 14;
const UPDATE_V2: u8 = 30;

// Account discriminators
const KEY_ASSET_V1: u8 = 1;
const KEY_PLUGIN_HEADER_V1: u8 = 3;
const KEY_PLUGIN_REGISTRY_V1: u8 = 4;
const KEY_COLLECTION_V1: u8 = 5;

const PLUGIN_TYPE_UPDATE_DELEGATE: u8 = 4;

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_URI_LEN: usize = 200;

#[derive(BorshSerialize)]
struct CreateV1Args {
    /// 0 = regular account state
    data_state: u8,
    name: String,
    uri: String,
    /// Plugin list; assets minted here carry none
    plugins: Option<Vec<u8>>,
}

#[derive(BorshSerialize)]
struct TransferV1Args {
    /// Only used for compressed assets
    compression_proof: Option<Vec<u8>>,
}

#[derive(BorshSerialize)]
struct CreateCollectionV1Args {
    name: String,
    uri: String,
    plugins: Option<Vec<u8>>,
}

/// `Plugin::UpdateDelegate`, encoded with its enum tag
struct UpdateDelegatePlugin {
    additional_delegates: Vec<[u8; 32]>,
}

impl BorshSerialize for UpdateDelegatePlugin {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        PLUGIN_TYPE_UPDATE_DELEGATE.serialize(writer)?;
        self.additional_delegates.serialize(writer)
    }
}

/// Who may act on a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
enum PluginAuthority {
    None,
    Owner,
    UpdateAuthority,
    Address { address: [u8; 32] },
}

#[derive(BorshSerialize)]
struct AddCollectionPluginV1Args {
    plugin: UpdateDelegatePlugin,
    init_authority: Option<PluginAuthority>,
}

/// Update authority recorded on an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAuthority {
    None,
    Address(Pubkey),
    Collection(Pubkey),
}

#[derive(BorshSerialize, BorshDeserialize)]
enum RawUpdateAuthority {
    None,
    Address([u8; 32]),
    Collection([u8; 32]),
}

impl From<UpdateAuthority> for RawUpdateAuthority {
    fn from(value: UpdateAuthority) -> Self {
        match value {
            UpdateAuthority::None => RawUpdateAuthority::None,
            UpdateAuthority::Address(k) => RawUpdateAuthority::Address(k.to_bytes()),
            UpdateAuthority::Collection(k) => RawUpdateAuthority::Collection(k.to_bytes()),
        }
    }
}

impl From<RawUpdateAuthority> for UpdateAuthority {
    fn from(value: RawUpdateAuthority) -> Self {
        match value {
            RawUpdateAuthority::None => UpdateAuthority::None,
            RawUpdateAuthority::Address(k) => UpdateAuthority::Address(Pubkey::new_from_array(k)),
            RawUpdateAuthority::Collection(k) => UpdateAuthority::Collection(Pubkey::new_from_array(k)),
        }
    }
}

#[derive(BorshSerialize)]
struct UpdateV2Args {
    new_name: Option<String>,
    new_uri: Option<String>,
    new_update_authority: Option<RawUpdateAuthority>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct CollectionBase {
    key: u8,
    update_authority: [u8; 32],
    name: String,
    uri: String,
    num_minted: u32,
    current_size: u32,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct PluginHeader {
    key: u8,
    plugin_registry_offset: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct RegistryRecord {
    plugin_type: u8,
    authority: PluginAuthority,
    offset: u64,
}

fn encode<T: BorshSerialize>(discriminator: u8, args: &T) -> Result<Vec<u8>, InstructionBuildError> {
    let mut data = vec![discriminator];
    args.serialize(&mut data)
        .map_err(|e| InstructionBuildError::new(&ASSET_PROGRAM_ID, e.to_string()))?;
    Ok(data)
}

fn absent() -> AccountMeta {
    AccountMeta::new_readonly(ASSET_PROGRAM_ID, false)
}

fn check_metadata(name: &str, uri: &str) -> Result<(), InstructionBuildError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(InstructionBuildError::new(
            &ASSET_PROGRAM_ID,
            format!("name must be 1..={} bytes, got {}", MAX_NAME_LEN, name.len()),
        ));
    }
    if uri.len() > MAX_URI_LEN {
        return Err(InstructionBuildError::new(
            &ASSET_PROGRAM_ID,
            format!("uri exceeds {} bytes", MAX_URI_LEN),
        ));
    }
    Ok(())
}

/// Create a new asset inside `collection`, owned by `owner`.
///
/// `asset` is a fresh keypair's address and must sign the transaction;
/// `payer` signs as both fee payer and collection authority.
pub fn create_asset(
    asset: &Pubkey,
    collection: &Pubkey,
    payer: &Pubkey,
    owner: &Pubkey,
    name: &str,
    uri: &str,
) -> Result<Instruction, InstructionBuildError> {
    check_metadata(name, uri)?;

    let data = encode(
        CREATE_V1,
        &CreateV1Args {
            data_state: 0,
            name: name.to_string(),
            uri: uri.to_string(),
            plugins: None,
        },
    )?;

    Ok(Instruction {
        program_id: ASSET_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*asset, true),
            AccountMeta::new(*collection, false),
            AccountMeta::new_readonly(*payer, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(*owner, false),
            // update authority comes from the collection
            absent(),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            absent(),
        ],
        data,
    })
}

/// Create a collection at `collection` (a fresh keypair that must sign)
pub fn create_collection(
    collection: &Pubkey,
    update_authority: &Pubkey,
    payer: &Pubkey,
    name: &str,
    uri: &str,
) -> Result<Instruction, InstructionBuildError> {
    check_metadata(name, uri)?;
    let data = encode(
        CREATE_COLLECTION_V1,
        &CreateCollectionV1Args {
            name: name.to_string(),
            uri: uri.to_string(),
            plugins: None,
        },
    )?;

    Ok(Instruction {
        program_id: ASSET_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*collection, true),
            AccountMeta::new_readonly(*update_authority, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    })
}

/// Make `delegate` an update delegate of `collection`.
///
/// `authority` is the collection's update authority and signs.
pub fn add_update_delegate(
    collection: &Pubkey,
    payer: &Pubkey,
    authority: &Pubkey,
    delegate: &Pubkey,
) -> Result<Instruction, InstructionBuildError> {
    let data = encode(
        ADD_COLLECTION_PLUGIN_V1,
        &AddCollectionPluginV1Args {
            plugin: UpdateDelegatePlugin {
                additional_delegates: Vec::new(),
            },
            init_authority: Some(PluginAuthority::Address {
                address: delegate.to_bytes(),
            }),
        },
    )?;

    Ok(Instruction {
        program_id: ASSET_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*collection, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            absent(),
        ],
        data,
    })
}

/// Replace the update authority of `asset`; name and uri are left alone
pub fn set_update_authority(
    asset: &Pubkey,
    collection: Option<&Pubkey>,
    payer: &Pubkey,
    authority: &Pubkey,
    new_authority: UpdateAuthority,
) -> Result<Instruction, InstructionBuildError> {
    let data = encode(
        UPDATE_V2,
        &UpdateV2Args {
            new_name: None,
            new_uri: None,
            new_update_authority: Some(new_authority.into()),
        },
    )?;

    Ok(Instruction {
        program_id: ASSET_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*asset, false),
            collection.map_or_else(absent, |c| AccountMeta::new(*c, false)),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(*authority, true),
            absent(),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            absent(),
        ],
        data,
    })
}

/// Transfer `asset` to `new_owner`; `payer` must be the current owner
pub fn transfer_asset(
    asset: &Pubkey,
    collection: &Pubkey,
    payer: &Pubkey,
    new_owner: &Pubkey,
) -> Result<Instruction, InstructionBuildError> {
    let data = encode(TRANSFER_V1, &TransferV1Args { compression_proof: None })?;

    Ok(Instruction {
        program_id: ASSET_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*asset, false),
            AccountMeta::new_readonly(*collection, false),
            AccountMeta::new(*payer, true),
            absent(),
            AccountMeta::new_readonly(*new_owner, false),
            absent(),
            absent(),
        ],
        data,
    })
}

/// Owner recorded in an asset account, if `data` is one
pub fn asset_owner(data: &[u8]) -> Option<Pubkey> {
    if data.first() != Some(&KEY_ASSET_V1) || data.len() < 33 {
        return None;
    }
    Pubkey::try_from(&data[1..33]).ok()
}

/// Update authority recorded in an asset account
pub fn asset_update_authority(data: &[u8]) -> Option<UpdateAuthority> {
    if data.first() != Some(&KEY_ASSET_V1) {
        return None;
    }
    let mut rest = data.get(33..)?;
    RawUpdateAuthority::deserialize(&mut rest).ok().map(Into::into)
}

/// Decoded collection account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionView {
    pub update_authority: Pubkey,
    pub name: String,
    pub uri: String,
    pub num_minted: u32,
    pub current_size: u32,
    /// Addresses holding the update-delegate plugin authority
    pub update_delegates: Vec<Pubkey>,
}

/// Decode a collection account, including its update delegates
pub fn decode_collection(data: &[u8]) -> Option<CollectionView> {
    let mut rest = data;
    let base = CollectionBase::deserialize(&mut rest).ok()?;
    if base.key != KEY_COLLECTION_V1 {
        return None;
    }
    let header_offset = data.len() - rest.len();

    let mut view = CollectionView {
        update_authority: Pubkey::new_from_array(base.update_authority),
        name: base.name,
        uri: base.uri,
        num_minted: base.num_minted,
        current_size: base.current_size,
        update_delegates: Vec::new(),
    };
    if header_offset == data.len() {
        return Some(view);
    }

    let header = PluginHeader::deserialize(&mut rest).ok()?;
    if header.key != KEY_PLUGIN_HEADER_V1 {
        return None;
    }
    let mut registry = data.get(usize::try_from(header.plugin_registry_offset).ok()?..)?;
    if u8::deserialize(&mut registry).ok()? != KEY_PLUGIN_REGISTRY_V1 {
        return None;
    }
    let records = Vec::<RegistryRecord>::deserialize(&mut registry).ok()?;
    view.update_delegates = records
        .into_iter()
        .filter(|r| r.plugin_type == PLUGIN_TYPE_UPDATE_DELEGATE)
        .filter(|r| (r.offset as usize) < data.len())
        .filter_map(|r| match r.authority {
            PluginAuthority::Address { address } => Some(Pubkey::new_from_array(address)),
            _ => None,
        })
        .collect();
    Some(view)
}

/// Collection account body with an optional update delegate plugin
#[cfg(any(test, feature = "test_utils"))]
pub fn encode_collection_account(update_authority: &Pubkey, name: &str, delegate: Option<&Pubkey>) -> Vec<u8> {
    let base = CollectionBase {
        key: KEY_COLLECTION_V1,
        update_authority: update_authority.to_bytes(),
        name: name.to_string(),
        uri: "https://nft.example/collection.json".to_string(),
        num_minted: 0,
        current_size: 0,
    };
    let mut data = borsh::to_vec(&base).unwrap_or_default();
    let Some(delegate) = delegate else {
        return data;
    };

    // header (9 bytes), plugin data (tag + empty vec), registry
    let plugin_offset = data.len() as u64 + 9;
    let registry_offset = plugin_offset + 5;
    let header = PluginHeader {
        key: KEY_PLUGIN_HEADER_V1,
        plugin_registry_offset: registry_offset,
    };
    data.extend(borsh::to_vec(&header).unwrap_or_default());
    data.extend(
        borsh::to_vec(&UpdateDelegatePlugin {
            additional_delegates: Vec::new(),
        })
        .unwrap_or_default(),
    );
    data.push(KEY_PLUGIN_REGISTRY_V1);
    let records = vec![RegistryRecord {
        plugin_type: PLUGIN_TYPE_UPDATE_DELEGATE,
        authority: PluginAuthority::Address {
            address: delegate.to_bytes(),
        },
        offset: plugin_offset,
    }];
    data.extend(borsh::to_vec(&records).unwrap_or_default());
    // no external plugin adapters
    data.extend(0u32.to_le_bytes());
    data
}

/// Minimal asset account body (key, owner, collection update authority)
#[cfg(any(test, feature = "test_utils"))]
pub fn encode_asset_account(owner: &Pubkey, collection: &Pubkey) -> Vec<u8> {
    let mut data = vec![KEY_ASSET_V1];
    data.extend_from_slice(owner.as_ref());
    data.push(2);
    data.extend_from_slice(collection.as_ref());
    data
}
