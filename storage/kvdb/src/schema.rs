// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::ColumnFamilyName;
use anyhow::Result;
use std::fmt::Debug;

/// Byte encoding of a schema's key type.
pub trait KeyCodec<S: Schema + ?Sized>: Sized + PartialEq + Debug {
    fn encode_key(&self) -> Result<Vec<u8>>;
    fn decode_key(data: &[u8]) -> Result<Self>;
}

/// Byte encoding of a schema's value type.
pub trait ValueCodec<S: Schema + ?Sized>: Sized + Debug {
    fn encode_value(&self) -> Result<Vec<u8>>;
    fn decode_value(data: &[u8]) -> Result<Self>;
}

/// Binds one column family to one `(Key, Value)` pair.
pub trait Schema: Debug + Send + Sync + 'static {
    const COLUMN_FAMILY_NAME: ColumnFamilyName;
    type Key: KeyCodec<Self>;
    type Value: ValueCodec<Self>;
}

/// Declares a unit struct implementing [`Schema`]:
///
/// ```ignore
/// define_schema!(BlockSchema, BlockKey, Block, "BLOCKS");
/// ```
#[macro_export]
macro_rules! define_schema {
    ($schema_type:ident, $key_type:ty, $value_type:ty, $cf_name:expr) => {
        #[derive(Debug)]
        pub(crate) struct $schema_type;

        impl $crate::Schema for $schema_type {
            const COLUMN_FAMILY_NAME: $crate::ColumnFamilyName = $cf_name;
            type Key = $key_type;
            type Value = $value_type;
        }
    };
}
