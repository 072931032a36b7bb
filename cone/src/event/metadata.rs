use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 事件元数据：键 → 值列表
///
/// - 同一键下的值保持插入顺序；
/// - 不同键之间的顺序不作保证；
/// - 读取不存在的键永远不会报错（`get` 返回空串，`values` 返回空切片）。
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖该键下的全部值
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// 追加一个值，键不存在时创建
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// 第一个值；键不存在时返回空串
    pub fn get(&self, key: &str) -> &str {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// 全部值；键不存在时返回空切片
    pub fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 键的数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.add(key, value);
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_previous_values() {
        let mut md = Metadata::new();
        md.add("some-key", "value1");
        md.add("some-key", "value2");
        md.set("some-key", "some-value");

        assert_eq!(md.len(), 1);
        assert_eq!(md.values("some-key"), ["some-value"]);
    }

    #[test]
    fn get_unset_key_is_empty() {
        let md = Metadata::new();
        assert_eq!(md.get("some-key"), "");
    }

    #[test]
    fn get_returns_first_value() {
        let mut md = Metadata::new();
        md.add("some-key", "value1");
        md.add("some-key", "value2");
        assert_eq!(md.get("some-key"), "value1");
    }

    #[test]
    fn add_preserves_insertion_order() {
        let mut md = Metadata::new();
        md.add("some-key", "value1");
        md.add("some-key", "value2");

        assert_eq!(md.len(), 1);
        assert_eq!(md.values("some-key"), ["value1", "value2"]);
    }

    #[test]
    fn values_on_unset_key_is_empty() {
        let md = Metadata::new();
        assert!(md.values("some-key").is_empty());
    }

    #[test]
    fn collects_pairs_as_multimap() {
        let md: Metadata = [("trace", "a"), ("tenant", "t-1"), ("trace", "b")]
            .into_iter()
            .collect();

        assert_eq!(md.values("trace"), ["a", "b"]);
        assert_eq!(md.get("tenant"), "t-1");
        assert!(md.contains_key("tenant"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut md = Metadata::new();
        md.add("k", "v");
        let json = serde_json::to_value(&md).unwrap();
        assert_eq!(json, serde_json::json!({ "k": ["v"] }));
    }
}
