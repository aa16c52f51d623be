//! Domain model (IDs, token records, persisted layout, errors).

pub mod errors;
pub mod ids;
pub mod keyspace;
pub mod token;

pub use self::errors::{ErrorKind, LeaseError, StoreError};
pub use self::ids::{ParseIdError, TokenId};
pub use self::keyspace::KeySpace;
pub use self::token::{
    LeaseState, TokenInfo, TokenRecord, decode_timestamp, encode_timestamp, new_lease_tag,
};
