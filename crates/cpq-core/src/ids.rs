//! Integer identifiers for catalog and quote records.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

id_type!(
    /// Unit of measure id.
    UnitTypeId
);
id_type!(
    /// Material id.
    MaterialId
);
id_type!(
    /// Sellable product id.
    ProductId
);
id_type!(
    /// Product-material association id.
    ProductMaterialId
);
id_type!(
    /// Variation group id.
    VariationGroupId
);
id_type!(
    /// Variation option id.
    VariationOptionId
);
id_type!(
    /// Variation-option-material association id.
    VariationOptionMaterialId
);
id_type!(
    /// Quote id.
    QuoteId
);
id_type!(
    /// Rate configuration id.
    QuoteConfigId
);
id_type!(
    /// Quote product entry id.
    EntryId
);
id_type!(
    /// Persisted calculation snapshot id.
    CalculatedQuoteId
);
