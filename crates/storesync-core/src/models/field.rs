//! Listing fields and their per-store limits

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Store;

/// A canonical listing field concept shared across storefronts.
///
/// Variant order is significant: `Name` sorts first so that title fields are
/// resolved before the fields that use the title as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// App name (App Store) / listing title (Google Play)
    Name,
    /// Subtitle (App Store) / short description (Google Play)
    Subtitle,
    /// Description (App Store) / full description (Google Play)
    Description,
    /// Search keywords, App Store only
    Keywords,
    /// Promotional text, App Store only
    PromotionalText,
    /// Release notes, App Store only
    WhatsNew,
}

impl Field {
    pub const ALL: [Self; 6] = [
        Self::Name,
        Self::Subtitle,
        Self::Description,
        Self::Keywords,
        Self::PromotionalText,
        Self::WhatsNew,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Subtitle => "subtitle",
            Self::Description => "description",
            Self::Keywords => "keywords",
            Self::PromotionalText => "promotional_text",
            Self::WhatsNew => "whats_new",
        }
    }

    /// Whether this field carries the listing's identity
    pub const fn is_title(self) -> bool {
        matches!(self, Self::Name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s.trim())
            .ok_or_else(|| format!("unknown field '{}'", s.trim()))
    }
}

/// How a field's length limit is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Unicode scalar values
    Chars,
    /// UTF-8 encoded bytes
    Bytes,
}

impl Unit {
    /// Measure `text` in this unit.
    pub fn measure(self, text: &str) -> usize {
        match self {
            Self::Chars => text.chars().count(),
            Self::Bytes => text.len(),
        }
    }

    /// Longest prefix of `text` whose measured length is at most `max`.
    ///
    /// Byte truncation never splits a multi-byte character.
    pub fn truncate(self, text: &str, max: usize) -> &str {
        match self {
            Self::Chars => text
                .char_indices()
                .nth(max)
                .map_or(text, |(index, _)| &text[..index]),
            Self::Bytes => {
                if text.len() <= max {
                    return text;
                }
                let mut end = max;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                &text[..end]
            }
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Chars => "characters",
            Self::Bytes => "bytes",
        }
    }
}

/// A storefront's definition of one listing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub field: Field,
    /// Storefront-native attribute name
    pub key: &'static str,
    pub max_len: usize,
    pub unit: Unit,
    /// Must be present to create the locale at all
    pub required_for_draft: bool,
    /// Must be present before the listing can be published
    pub required_for_publish: bool,
}

impl FieldSpec {
    const fn new(field: Field, key: &'static str, max_len: usize, unit: Unit) -> Self {
        Self {
            field,
            key,
            max_len,
            unit,
            required_for_draft: false,
            required_for_publish: false,
        }
    }

    const fn draft(mut self) -> Self {
        self.required_for_draft = true;
        self
    }

    const fn publish(mut self) -> Self {
        self.required_for_publish = true;
        self
    }

    pub fn measure(&self, text: &str) -> usize {
        self.unit.measure(text)
    }

    pub fn fits(&self, text: &str) -> bool {
        self.measure(text) <= self.max_len
    }

    pub fn truncate<'a>(&self, text: &'a str) -> &'a str {
        self.unit.truncate(text, self.max_len)
    }
}

const APP_STORE_FIELDS: [FieldSpec; 6] = [
    FieldSpec::new(Field::Name, "name", 30, Unit::Chars).draft(),
    FieldSpec::new(Field::Subtitle, "subtitle", 30, Unit::Chars),
    FieldSpec::new(Field::Description, "description", 4000, Unit::Chars)
        .draft()
        .publish(),
    FieldSpec::new(Field::Keywords, "keywords", 100, Unit::Bytes).publish(),
    FieldSpec::new(Field::PromotionalText, "promotionalText", 170, Unit::Chars),
    FieldSpec::new(Field::WhatsNew, "whatsNew", 4000, Unit::Chars),
];

const GOOGLE_PLAY_FIELDS: [FieldSpec; 3] = [
    FieldSpec::new(Field::Name, "title", 30, Unit::Chars)
        .draft()
        .publish(),
    FieldSpec::new(Field::Subtitle, "shortDescription", 80, Unit::Chars)
        .draft()
        .publish(),
    FieldSpec::new(Field::Description, "fullDescription", 4000, Unit::Chars)
        .draft()
        .publish(),
];

impl Store {
    /// Static field table for this store.
    pub const fn field_specs(self) -> &'static [FieldSpec] {
        match self {
            Self::AppStore => &APP_STORE_FIELDS,
            Self::GooglePlay => &GOOGLE_PLAY_FIELDS,
        }
    }

    pub fn field_spec(self, field: Field) -> Option<&'static FieldSpec> {
        self.field_specs().iter().find(|spec| spec.field == field)
    }

    /// Resolve a storefront-native attribute name to its field concept.
    pub fn field_for_key(self, key: &str) -> Option<Field> {
        self.field_specs()
            .iter()
            .find(|spec| spec.key == key)
            .map(|spec| spec.field)
    }

    /// Fields that must be queued before a new locale can be created.
    pub fn draft_required_fields(self) -> Vec<Field> {
        self.field_specs()
            .iter()
            .filter(|spec| spec.required_for_draft)
            .map(|spec| spec.field)
            .collect()
    }
}

/// Fields that can be carried from `source` to `target`, in `Field` order.
pub fn shared_fields(source: Store, target: Store) -> Vec<Field> {
    source
        .field_specs()
        .iter()
        .map(|spec| spec.field)
        .filter(|field| target.field_spec(*field).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_measurement_differs_from_chars_for_multibyte_text() {
        let text = "あ".repeat(50);
        assert_eq!(Unit::Chars.measure(&text), 50);
        assert_eq!(Unit::Bytes.measure(&text), 150);
    }

    #[test]
    fn keywords_are_byte_limited() {
        let spec = Store::AppStore.field_spec(Field::Keywords).unwrap();
        assert_eq!(spec.unit, Unit::Bytes);
        assert!(!spec.fits(&"é".repeat(60)));
        assert!(spec.fits(&"e".repeat(100)));
    }

    #[test]
    fn byte_truncation_respects_char_boundaries() {
        let text = "ab日本";
        assert_eq!(Unit::Bytes.truncate(text, 4), "ab");
        assert_eq!(Unit::Bytes.truncate(text, 5), "ab日");
        assert_eq!(Unit::Bytes.truncate(text, 100), text);
    }

    #[test]
    fn char_truncation_counts_scalars() {
        assert_eq!(Unit::Chars.truncate("日本語テキスト", 3), "日本語");
        assert_eq!(Unit::Chars.truncate("abc", 3), "abc");
    }

    #[test]
    fn shared_fields_between_stores_are_the_common_three() {
        assert_eq!(
            shared_fields(Store::AppStore, Store::GooglePlay),
            vec![Field::Name, Field::Subtitle, Field::Description]
        );
        assert_eq!(
            shared_fields(Store::GooglePlay, Store::AppStore),
            vec![Field::Name, Field::Subtitle, Field::Description]
        );
        assert_eq!(
            shared_fields(Store::AppStore, Store::AppStore).len(),
            Field::ALL.len()
        );
    }

    #[test]
    fn native_keys_resolve_per_store() {
        assert_eq!(Store::GooglePlay.field_for_key("title"), Some(Field::Name));
        assert_eq!(
            Store::GooglePlay.field_for_key("shortDescription"),
            Some(Field::Subtitle)
        );
        assert_eq!(Store::AppStore.field_for_key("title"), None);
        assert_eq!(Store::AppStore.field_for_key("whatsNew"), Some(Field::WhatsNew));
    }

    #[test]
    fn draft_requirements() {
        assert_eq!(
            Store::AppStore.draft_required_fields(),
            vec![Field::Name, Field::Description]
        );
        assert_eq!(Store::GooglePlay.draft_required_fields().len(), 3);
    }

    #[test]
    fn field_round_trips_through_str() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
    }
}
