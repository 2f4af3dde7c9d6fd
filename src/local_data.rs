use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

/// Read-only view of locally persisted values (session and server tokens)
/// that fill `{name}` placeholders in route templates.
pub trait LocalData: Send + Sync {
    fn placeholder(&self, name: &str) -> Option<String>;
}

/// Local data with no placeholder values.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLocalData;

impl LocalData for NoLocalData {
    fn placeholder(&self, _name: &str) -> Option<String> {
        None
    }
}

impl LocalData for HashMap<String, String> {
    fn placeholder(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl LocalData for BTreeMap<String, String> {
    fn placeholder(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Values that another component may rotate, such as a refreshed session token.
impl LocalData for RwLock<HashMap<String, String>> {
    fn placeholder(&self, name: &str) -> Option<String> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Replaces every `{name}` in `template` that `data` knows about.
///
/// Unknown placeholders are left in place.
pub(crate) fn substitute(template: &str, data: &dyn LocalData) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match data.placeholder(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
