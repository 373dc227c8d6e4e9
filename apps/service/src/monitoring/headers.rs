/// Parsed form of a service's `"key=value,key=value"` header string.
///
/// Shared by every probe: HTTP sends the pairs as request headers, the mail
/// probes read `username` / `password` from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    pairs: Vec<(String, String)>,
}

impl HeaderList {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .unwrap_or_default()
            .split(',')
            .filter_map(|entry| entry.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self { pairs }
    }

    /// First value whose key matches case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// `(username, password)` when both are present and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.get("username").filter(|value| !value.is_empty())?;
        let password = self.get("password").filter(|value| !value.is_empty())?;
        Some((username, password))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
