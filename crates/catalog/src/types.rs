//! Catalog records and the raw shapes returned by the remote source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Icon used for items synthesized on first reference.
pub const DEFAULT_ICON: &str = "https://i.imgur.com/BJZCnJF.png";

/// Rarity used when the remote record carries none.
pub const DEFAULT_RARITY: &str = "common";

/// Internal item category.
///
/// Remote category strings are folded into this closed set; anything
/// unrecognized becomes [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Outfit,
    Backpack,
    Pickaxe,
    Emote,
    Glider,
    Wrap,
    Contrail,
    LoadingScreen,
    Music,
    Other,
}

impl Category {
    /// Returns the stored/wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Outfit => "outfit",
            Category::Backpack => "backpack",
            Category::Pickaxe => "pickaxe",
            Category::Emote => "emote",
            Category::Glider => "glider",
            Category::Wrap => "wrap",
            Category::Contrail => "contrail",
            Category::LoadingScreen => "loadingscreen",
            Category::Music => "music",
            Category::Other => "other",
        }
    }

    /// Maps a category string (case-insensitive) through the fixed lookup
    /// table. Unrecognized values map to [`Category::Other`].
    pub fn from_remote(value: &str) -> Category {
        match value.to_ascii_lowercase().as_str() {
            "outfit" => Category::Outfit,
            "backpack" => Category::Backpack,
            "pickaxe" => Category::Pickaxe,
            "emote" => Category::Emote,
            "glider" => Category::Glider,
            "wrap" => Category::Wrap,
            "contrail" => Category::Contrail,
            "loadingscreen" => Category::LoadingScreen,
            "music" => Category::Music,
            _ => Category::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub rarity: String,
    pub icon: String,
    /// Creation or last refresh time.
    pub added_at: DateTime<Utc>,
}

impl Item {
    /// Minimal record for an id the catalog has never seen.
    pub fn placeholder(id: &str, category: Category) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            category,
            rarity: DEFAULT_RARITY.to_string(),
            icon: DEFAULT_ICON.to_string(),
            added_at: Utc::now(),
        }
    }
}

/// A cached style variant. Unique per `(item_id, channel, tag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub item_id: String,
    pub channel: String,
    pub tag: String,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawImages {
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: Option<String>,
}

/// Item record as listed by the remote source.
///
/// Every field may be missing. A field of the wrong JSON type reads as
/// missing instead of failing the record, and `type`/`rarity` accept both
/// the `{"value": ...}` wrapper and a bare string.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_tag")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_tag")]
    pub rarity: Option<String>,
    #[serde(default, deserialize_with = "lenient_images")]
    pub images: Option<RawImages>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_tag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Object(map) => match map.get("value") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_images<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RawImages>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => Some(RawImages {
            icon: match map.get("icon") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            },
        }),
        _ => None,
    })
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

impl RawItem {
    /// Reads one listing record. Anything that is not an object yields an
    /// empty record, which reconciliation skips.
    pub fn from_value(value: Value) -> RawItem {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Converts the raw record into an [`Item`].
    ///
    /// Returns `None` when the id, name or icon is missing.
    pub fn to_item(&self, now: DateTime<Utc>) -> Option<Item> {
        let id = non_empty(self.id.as_ref())?;
        let name = non_empty(self.name.as_ref())?;
        let icon = non_empty(self.images.as_ref().and_then(|i| i.icon.as_ref()))?;

        let category = non_empty(self.kind.as_ref())
            .map(Category::from_remote)
            .unwrap_or(Category::Other);
        let rarity = non_empty(self.rarity.as_ref()).unwrap_or(DEFAULT_RARITY);

        Some(Item {
            id: id.to_string(),
            name: name.to_string(),
            category,
            rarity: rarity.to_string(),
            icon: icon.to_string(),
            added_at: now,
        })
    }
}

/// One option within a remote variant channel.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawVariantOption {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// A variant channel with its options, as returned by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawVariantChannel {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub options: Vec<RawVariantOption>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawItem {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn category_lookup_is_case_insensitive() {
        assert_eq!(Category::from_remote("Outfit"), Category::Outfit);
        assert_eq!(Category::from_remote("LOADINGSCREEN"), Category::LoadingScreen);
        assert_eq!(Category::from_remote("bannertoken"), Category::Other);
    }

    #[test]
    fn category_names_roundtrip() {
        for cat in [
            Category::Outfit,
            Category::Backpack,
            Category::Pickaxe,
            Category::Emote,
            Category::Glider,
            Category::Wrap,
            Category::Contrail,
            Category::LoadingScreen,
            Category::Music,
            Category::Other,
        ] {
            assert_eq!(Category::from_remote(cat.as_str()), cat);
        }
    }

    #[test]
    fn complete_raw_item_converts() {
        let item = raw(
            r#"{"id":"A","name":"Foo","type":{"value":"outfit"},
                "rarity":{"value":"epic"},"images":{"icon":"u"}}"#,
        )
        .to_item(Utc::now())
        .unwrap();
        assert_eq!(item.id, "A");
        assert_eq!(item.category, Category::Outfit);
        assert_eq!(item.rarity, "epic");
        assert_eq!(item.icon, "u");
    }

    #[test]
    fn bare_string_tags_accepted() {
        let item = raw(r#"{"id":"A","name":"Foo","type":"outfit","rarity":"rare","images":{"icon":"u"}}"#)
            .to_item(Utc::now())
            .unwrap();
        assert_eq!(item.category, Category::Outfit);
        assert_eq!(item.rarity, "rare");
    }

    #[test]
    fn mistyped_fields_read_as_missing() {
        let record = raw(r#"{"id":42,"name":"Bad","type":7,"rarity":[],"images":"u"}"#);
        assert_eq!(record.id, None);
        assert_eq!(record.kind, None);
        assert_eq!(record.rarity, None);
        assert_eq!(record.images, None);
        assert!(record.to_item(Utc::now()).is_none());

        let item = raw(r#"{"id":"A","name":"Foo","type":{"value":1},"images":{"icon":"u"}}"#)
            .to_item(Utc::now())
            .unwrap();
        assert_eq!(item.category, Category::Other);
    }

    #[test]
    fn non_object_record_is_empty() {
        assert_eq!(RawItem::from_value(serde_json::json!(42)), RawItem::default());
        assert_eq!(RawItem::from_value(serde_json::json!(null)), RawItem::default());
        assert_eq!(
            RawItem::from_value(serde_json::json!({"id": "A"})).id.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn missing_rarity_and_type_use_defaults() {
        let item = raw(r#"{"id":"A","name":"Foo","images":{"icon":"u"}}"#)
            .to_item(Utc::now())
            .unwrap();
        assert_eq!(item.category, Category::Other);
        assert_eq!(item.rarity, DEFAULT_RARITY);
    }

    #[test]
    fn incomplete_raw_items_rejected() {
        for json in [
            r#"{"id":"B"}"#,
            r#"{"name":"Foo","images":{"icon":"u"}}"#,
            r#"{"id":"A","name":"Foo"}"#,
            r#"{"id":"A","name":"","images":{"icon":"u"}}"#,
            r#"{"id":"A","name":"Foo","images":{}}"#,
        ] {
            assert!(raw(json).to_item(Utc::now()).is_none(), "{json}");
        }
    }

    #[test]
    fn placeholder_defaults() {
        let item = Item::placeholder("X", Category::Outfit);
        assert_eq!(item.name, "X");
        assert_eq!(item.rarity, "common");
        assert_eq!(item.icon, DEFAULT_ICON);
    }
}
