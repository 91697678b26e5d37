//! Proptest generators for property-based testing.

use proptest::prelude::*;

use strongbox_vault::{Field, FieldKind, VaultItem};

/// Generate a field kind.
pub fn field_kind() -> impl Strategy<Value = FieldKind> {
    prop_oneof![
        Just(FieldKind::Text),
        Just(FieldKind::Username),
        Just(FieldKind::Password),
        Just(FieldKind::Url),
        Just(FieldKind::Email),
        Just(FieldKind::Note),
        Just(FieldKind::Totp),
    ]
}

/// Generate a field with a short printable name and value.
pub fn field() -> impl Strategy<Value = Field> {
    ("[A-Za-z][A-Za-z ]{0,15}", "[ -~]{0,64}", field_kind())
        .prop_map(|(name, value, kind)| Field::new(name, value, kind))
}

/// Generate an item name.
pub fn item_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ._-]{0,31}".prop_map(String::from)
}

/// Generate a tag.
pub fn tag() -> impl Strategy<Value = String> {
    "[a-z]{1,12}".prop_map(String::from)
}

/// Parameters for generating an item.
#[derive(Debug, Clone)]
pub struct ItemParams {
    pub name: String,
    pub fields: Vec<Field>,
    pub tags: Vec<String>,
}

impl Arbitrary for ItemParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            item_name(),
            prop::collection::vec(field(), 0..6),
            prop::collection::vec(tag(), 0..4),
        )
            .prop_map(|(name, fields, tags)| ItemParams { name, fields, tags })
            .boxed()
    }
}

/// Build a fresh item from parameters.
pub fn item_from_params(params: &ItemParams) -> VaultItem {
    VaultItem::new(
        params.name.clone(),
        params.fields.clone(),
        params.tags.clone(),
    )
}

/// Generate a batch of fresh items.
pub fn items(max: usize) -> impl Strategy<Value = Vec<VaultItem>> {
    prop::collection::vec(any::<ItemParams>(), 0..=max)
        .prop_map(|params| params.iter().map(item_from_params).collect())
}
