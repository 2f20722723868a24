/// Declares a unit struct implementing [`EntityType`](crate::entity::EntityType).
///
/// ```
/// rowkeep::entity_type! {
///     pub struct Article {
///         table: "article",
///         columns: [id, title, slug, lang, created_at, updated_at, deleted_at],
///         cache: [[id], [slug, lang]],
///     }
/// }
///
/// use rowkeep::EntityType;
/// assert_eq!(Article::TABLE, "article");
/// assert_eq!(Article::ID_COLUMN, "id");
/// assert!(Article::tracks("slug"));
/// ```
///
/// `id: "column"` overrides the primary key column; it should also be listed in
/// `columns`. Without `cache` nothing is registered in the identity cache.
#[macro_export]
macro_rules! entity_type {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            table: $table:literal,
            $(id: $id:literal,)?
            columns: [$($column:ident),+ $(,)?] $(,)?
            $(cache: [$([$($cache_column:ident),+ $(,)?]),* $(,)?] $(,)?)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        $vis struct $name;

        impl $crate::entity::EntityType for $name {
            const TABLE: &'static str = $table;
            $(const ID_COLUMN: &'static str = $id;)?
            const COLUMNS: &'static [&'static str] = &[$(stringify!($column)),+];
            $(
                const CACHE_CRITERIA: &'static [&'static [&'static str]] =
                    &[$(&[$(stringify!($cache_column)),+]),*];
            )?
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::entity::EntityType;

    crate::entity_type! {
        /// Keyed by a non-default column.
        struct Account {
            table: "account",
            id: "account_id",
            columns: [account_id, email],
            cache: [[account_id], [email]],
        }
    }

    crate::entity_type! {
        struct Bare {
            table: "bare",
            columns: [id, note]
        }
    }

    #[test]
    fn test_declared_constants() {
        assert_eq!(Account::TABLE, "account");
        assert_eq!(Account::ID_COLUMN, "account_id");
        assert_eq!(Account::COLUMNS, &["account_id", "email"]);
        assert_eq!(Account::CACHE_CRITERIA.len(), 2);
        assert_eq!(Account::CACHE_CRITERIA[1], &["email"]);
    }

    #[test]
    fn test_defaults_without_optional_sections() {
        assert_eq!(Bare::ID_COLUMN, "id");
        assert!(Bare::CACHE_CRITERIA.is_empty());
        assert!(!Bare::tracks("created_at"));
    }
}
