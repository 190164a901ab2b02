//! Incoming-key resolution for struct destinations.
//!
//! The compile-time half of field discovery is serde derive: `rename` tags,
//! `skip`ped fields, and `flatten`ed embedded structs are all settled before
//! this crate sees a byte. What remains at runtime is matching the keys of an
//! incoming object against the declared field list, and servers are sloppy
//! about case, so the match is forgiving: exact first, then
//! ASCII-case-insensitive, first hit wins.

/// The declared field names of one struct destination.
#[derive(Copy, Clone)]
pub(crate) struct FieldSet {
    names: &'static [&'static str],
}

impl FieldSet {
    pub(crate) fn new(names: &'static [&'static str]) -> Self {
        FieldSet { names }
    }

    /// Resolve a wire key to its canonical declared name.
    ///
    /// Returns `None` when the key matches no field; callers treat that as a
    /// binding error rather than skipping data silently.
    pub(crate) fn resolve(&self, key: &str) -> Option<&'static str> {
        if let Some(name) = self.names.iter().find(|name| **name == key) {
            return Some(name);
        }

        self.names.iter().find(|name| name.eq_ignore_ascii_case(key)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &["Name", "age", "is_fresh_instance"];

    #[test]
    fn exact_match_wins() {
        let set = FieldSet::new(NAMES);
        assert_eq!(set.resolve("Name"), Some("Name"));
        assert_eq!(set.resolve("age"), Some("age"));
    }

    #[test]
    fn falls_back_to_case_insensitive() {
        let set = FieldSet::new(NAMES);
        assert_eq!(set.resolve("name"), Some("Name"));
        assert_eq!(set.resolve("AGE"), Some("age"));
        assert_eq!(set.resolve("Is_Fresh_Instance"), Some("is_fresh_instance"));
    }

    #[test]
    fn exact_beats_case_insensitive_when_both_exist() {
        let set = FieldSet::new(&["name", "Name"]);
        assert_eq!(set.resolve("Name"), Some("Name"));
        assert_eq!(set.resolve("name"), Some("name"));
        // No exact hit: the first case-insensitive candidate wins.
        assert_eq!(set.resolve("NAME"), Some("name"));
    }

    #[test]
    fn unknown_key_resolves_to_none() {
        let set = FieldSet::new(NAMES);
        assert_eq!(set.resolve("nom"), None);
        assert_eq!(set.resolve(""), None);
    }
}
