//! Base model system
//!
//! The `Model` trait binds a reflected schema to identity, timestamp, and
//! soft-delete policy. Models are declared through the `model!` macro, which
//! derives the schema descriptor and all trait plumbing at compile time; a
//! declaration without a `pk` field does not match the macro and fails to
//! compile.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::error::OrmResult;
use crate::row::{FromDbValue, Row};
use crate::schema::Schema;
use crate::value::DbValue;

/// A typed schema definition bound to one table
pub trait Model: Schema + Clone + Debug + Send + Sync + 'static {
    /// Primary key type; `None` in an instance means not yet persisted.
    type Key: FromDbValue + Into<DbValue> + Clone + Debug + Send + Sync;

    fn primary_key(&self) -> Option<Self::Key>;

    fn set_primary_key(&mut self, key: Self::Key);

    fn primary_key_value(&self) -> Option<DbValue> {
        self.primary_key().map(Into::into)
    }

    /// Materialize an instance from a result row.
    fn from_row(row: &Row) -> OrmResult<Self>;

    /// Whether `create_time`/`update_time` columns are managed automatically.
    fn uses_timestamps() -> bool {
        false
    }

    /// Whether deletes set `delete_time` instead of removing the row.
    fn uses_soft_deletes() -> bool {
        false
    }

    fn create_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_create_time(&mut self, _ts: DateTime<Utc>) {}

    fn update_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_update_time(&mut self, _ts: DateTime<Utc>) {}

    fn delete_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_delete_time(&mut self, _ts: Option<DateTime<Utc>>) {}

    fn is_soft_deleted(&self) -> bool {
        self.delete_time().is_some()
    }

    /// Soft-delete marker column; only meaningful when `uses_soft_deletes`.
    fn delete_time_column() -> &'static str {
        "delete_time"
    }
}

/// Declares a model struct and derives its `Schema` and `Model` impls.
///
/// The primary key field must come first and carry the `pk` marker; it is
/// stored as `Option<K>` so an absent key means "not yet persisted". Optional
/// trailing `options { timestamps }` / `options { soft_deletes }` enable the
/// automatic policies; enabling one requires the matching column
/// (`create_time`/`update_time`/`delete_time`) to be declared, otherwise the
/// generated accessors fail to compile.
///
/// ```ignore
/// model! {
///     pub struct User {
///         pk id: i64,
///         name: String,
///         age: i64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            pk $pk:ident: $pk_ty:ty,
            $($field:ident: $fty:ty),+ $(,)?
        }
    ) => {
        $crate::model!(@define
            $(#[$meta])* $vis struct $name { pk $pk: $pk_ty, $($field: $fty),+ }
            extra {}
        );
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            pk $pk:ident: $pk_ty:ty,
            $($field:ident: $fty:ty),+ $(,)?
        }
        options { timestamps }
    ) => {
        $crate::model!(@define
            $(#[$meta])* $vis struct $name { pk $pk: $pk_ty, $($field: $fty),+ }
            extra { $crate::model!(@timestamp_methods); }
        );
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            pk $pk:ident: $pk_ty:ty,
            $($field:ident: $fty:ty),+ $(,)?
        }
        options { soft_deletes }
    ) => {
        $crate::model!(@define
            $(#[$meta])* $vis struct $name { pk $pk: $pk_ty, $($field: $fty),+ }
            extra { $crate::model!(@soft_delete_methods); }
        );
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            pk $pk:ident: $pk_ty:ty,
            $($field:ident: $fty:ty),+ $(,)?
        }
        options { timestamps, soft_deletes }
    ) => {
        $crate::model!(@define
            $(#[$meta])* $vis struct $name { pk $pk: $pk_ty, $($field: $fty),+ }
            extra {
                $crate::model!(@timestamp_methods);
                $crate::model!(@soft_delete_methods);
            }
        );
    };

    (@timestamp_methods) => {
        fn uses_timestamps() -> bool {
            true
        }

        fn create_time(&self) -> ::core::option::Option<$crate::__private::DateTime<$crate::__private::Utc>> {
            self.create_time
        }

        fn set_create_time(&mut self, ts: $crate::__private::DateTime<$crate::__private::Utc>) {
            self.create_time = ::core::option::Option::Some(ts);
        }

        fn update_time(&self) -> ::core::option::Option<$crate::__private::DateTime<$crate::__private::Utc>> {
            self.update_time
        }

        fn set_update_time(&mut self, ts: $crate::__private::DateTime<$crate::__private::Utc>) {
            self.update_time = ::core::option::Option::Some(ts);
        }
    };

    (@soft_delete_methods) => {
        fn uses_soft_deletes() -> bool {
            true
        }

        fn delete_time(&self) -> ::core::option::Option<$crate::__private::DateTime<$crate::__private::Utc>> {
            self.delete_time
        }

        fn set_delete_time(&mut self, ts: ::core::option::Option<$crate::__private::DateTime<$crate::__private::Utc>>) {
            self.delete_time = ts;
        }
    };

    (@define
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { pk $pk:ident: $pk_ty:ty, $($field:ident: $fty:ty),+ }
        extra { $($extra:tt)* }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        $vis struct $name {
            $vis $pk: ::core::option::Option<$pk_ty>,
            $($vis $field: $fty,)+
        }

        impl $crate::schema::Schema for $name {
            fn table_name() -> &'static str {
                static TABLE: $crate::__private::Lazy<::std::string::String> =
                    $crate::__private::Lazy::new(|| stringify!($name).to_lowercase());
                TABLE.as_str()
            }

            fn primary_key_name() -> &'static str {
                stringify!($pk)
            }

            fn field_names() -> &'static [&'static str] {
                &[$(stringify!($field)),+]
            }

            fn to_params(&self) -> ::std::vec::Vec<$crate::value::DbValue> {
                vec![$($crate::value::DbValue::from(self.$field.clone())),+]
            }
        }

        impl $crate::model::Model for $name {
            type Key = $pk_ty;

            fn primary_key(&self) -> ::core::option::Option<Self::Key> {
                self.$pk.clone()
            }

            fn set_primary_key(&mut self, key: Self::Key) {
                self.$pk = ::core::option::Option::Some(key);
            }

            fn from_row(row: &$crate::row::Row) -> $crate::error::OrmResult<Self> {
                ::core::result::Result::Ok(Self {
                    $pk: row.column::<::core::option::Option<$pk_ty>>(stringify!($pk))?,
                    $($field: row.column::<$fty>(stringify!($field))?,)+
                })
            }

            $($extra)*
        }
    };
}
