//! Namespaced key layout.
//!
//! Every key starts with the configured prefix so independent deployments can
//! share one store instance:
//!
//! | Region            | Key                                                    | Kind       |
//! |-------------------|--------------------------------------------------------|------------|
//! | record            | `{p}:hash:{model}:{id}`                                | hash       |
//! | id enumeration    | `{p}:idsets:{model}`                                   | set        |
//! | id counter        | `{p}:ids:{model}`                                      | counter    |
//! | unique claim      | `{p}:uniques:{model}:{prop}:{value}`                   | string     |
//! | standard index    | `{p}:index:{model}:{prop}:{value}`                     | set        |
//! | scored index      | `{p}:scoredindex:{model}:{prop}`                       | sorted set |
//! | relation          | `{p}:relations:{model}:{name}:{target}:{id}`           | set        |
//! | scored relation   | `{p}:scoredrelations:{model}:{name}:{target}:{id}`     | sorted set |
//! | relation registry | `{p}:relationkeys:{model}:{id}`                        | set        |
//! | event channel     | `{p}:channel:{model}:{kind}`                           | pub/sub    |

/// Builds keys under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hash(&self, model: &str, id: &str) -> String {
        format!("{}:hash:{model}:{id}", self.prefix)
    }

    pub fn idset(&self, model: &str) -> String {
        format!("{}:idsets:{model}", self.prefix)
    }

    pub fn id_counter(&self, model: &str) -> String {
        format!("{}:ids:{model}", self.prefix)
    }

    pub fn unique(&self, model: &str, property: &str, value: &str) -> String {
        format!("{}:uniques:{model}:{property}:{value}", self.prefix)
    }

    pub fn index(&self, model: &str, property: &str, value: &str) -> String {
        format!("{}:index:{model}:{property}:{value}", self.prefix)
    }

    pub fn scored_index(&self, model: &str, property: &str) -> String {
        format!("{}:scoredindex:{model}:{property}", self.prefix)
    }

    pub fn relation(&self, model: &str, name: &str, target: &str, id: &str) -> String {
        format!("{}:relations:{model}:{name}:{target}:{id}", self.prefix)
    }

    pub fn scored_relation(&self, model: &str, name: &str, target: &str, id: &str) -> String {
        format!("{}:scoredrelations:{model}:{name}:{target}:{id}", self.prefix)
    }

    pub fn relation_keys(&self, model: &str, id: &str) -> String {
        format!("{}:relationkeys:{model}:{id}", self.prefix)
    }

    pub fn channel(&self, model: &str, kind: &str) -> String {
        format!("{}:channel:{model}:{kind}", self.prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(crate::DEFAULT_PREFIX)
    }
}
