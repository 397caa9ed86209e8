use std::collections::BTreeMap;

use tracing::debug;

/// Key prefix of a space entry in a flat property map.
pub const SPACE_PREFIX: &str = "space.";
/// Key of the destination list applied to spaces created after startup.
pub const NEW_SPACE_DEFAULT: &str = "new-space-default";

/// Space id to destination store ids, plus the default destinations of
/// newly created spaces.
///
/// A mapping is immutable. Reloading replaces it as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicationConfig {
    spaces: BTreeMap<String, Vec<String>>,
    new_space_default: Vec<String>,
}

impl DuplicationConfig {
    /// Builds a mapping from `(space id, comma separated store ids)` pairs.
    #[must_use]
    pub fn from_entries<'a>(
        spaces: impl IntoIterator<Item = (&'a str, &'a str)>,
        new_space_default: Option<&str>,
    ) -> Self {
        Self {
            spaces: spaces
                .into_iter()
                .map(|(space_id, stores)| (space_id.trim().to_string(), parse_store_list(stores)))
                .collect(),
            new_space_default: new_space_default.map(parse_store_list).unwrap_or_default(),
        }
    }

    /// Builds a mapping from flat properties: `space.<space id>` and
    /// `new-space-default` keys, each holding comma separated store ids.
    /// Other keys are ignored.
    #[must_use]
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        let spaces = properties.iter().filter_map(|(key, value)| {
            if let Some(space_id) = key.strip_prefix(SPACE_PREFIX) {
                Some((space_id, value.as_str()))
            } else {
                if key != NEW_SPACE_DEFAULT {
                    debug!(key, "ignoring unknown duplication property");
                }
                None
            }
        });
        Self::from_entries(
            spaces,
            properties.get(NEW_SPACE_DEFAULT).map(String::as_str),
        )
    }

    /// Destination store ids of an explicitly configured space.
    #[must_use]
    pub fn space_destinations(&self, space_id: &str) -> Option<&[String]> {
        self.spaces.get(space_id).map(Vec::as_slice)
    }

    /// Destination store ids of a space, empty when it is not configured.
    #[must_use]
    pub fn destinations(&self, space_id: &str) -> &[String] {
        self.space_destinations(space_id).unwrap_or_default()
    }

    #[must_use]
    pub fn new_space_default(&self) -> &[String] {
        &self.new_space_default
    }

    /// Ids of the explicitly configured spaces.
    pub fn spaces(&self) -> impl Iterator<Item = &str> {
        self.spaces.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty() && self.new_space_default.is_empty()
    }
}

fn parse_store_list(value: &str) -> Vec<String> {
    let mut stores: Vec<String> = Vec::new();
    for store in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !stores.iter().any(|s| s == store) {
            stores.push(store.to_string());
        }
    }
    stores
}
