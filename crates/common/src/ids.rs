use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            pub const fn value(&self) -> i64 {
                self.0
            }

            /// Identifiers are assigned from positive sequences; anything else
            /// cannot refer to a stored row.
            pub const fn is_valid(&self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of an order row in the order store.
    OrderId
);

define_id!(
    /// Identifier of a product row in the stock ledger.
    ///
    /// Ordering on this type is the lock acquisition order for product rows.
    ProductId
);

define_id!(
    /// Identifier of the buying user.
    UserId
);

define_id!(
    /// Identifier of the shop that owns a product.
    ShopId
);
