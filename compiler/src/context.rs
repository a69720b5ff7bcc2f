use std::collections::{BTreeMap, HashMap};

use crate::error::TrcError;
use crate::types::{lookup_builtin, CompoundKind, FIRST_TAG};
use crate::utils::quote;

/// Facts about a compiled message that later declarations may depend on:
/// where its tag sequence ended (inheritance continues from there) and the
/// version it carries.
#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub next_tag: u32,
    pub version:  i64,
}

/// Compilation-scoped state threaded through parsing and verification: the
/// global type registry, `using`/`typedef` aliases, and the counters behind
/// synthesized names for anonymous compounds.
#[derive(Debug, Default)]
pub struct Context {
    registry: HashMap<String, CompoundKind>,
    aliases:  BTreeMap<String, String>,
    counters: HashMap<&'static str, u32>,
    messages: HashMap<String, MessageInfo>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Register a named type. Builtins and earlier declarations shadowing is
    /// a semantic error.
    pub fn define(&mut self, name: &str, kind: CompoundKind, line: usize) -> Result<(), TrcError> {
        if lookup_builtin(name).is_some() || self.registry.contains_key(name) {
            return Err(TrcError::Semantic {
                msg: format!("the type {} is defined twice", quote(name)),
                line,
            });
        }
        self.registry.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn alias(&mut self, name: String, target: String) {
        self.aliases.insert(name, target);
    }

    /// Resolve a name against the global alias table and registry. Local
    /// alias maps are the parser's business; this is lookup step (b).
    pub fn resolve(&self, name: &str) -> Option<(String, CompoundKind)> {
        let canonical = self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name);
        self.registry
            .get(canonical)
            .map(|kind| (canonical.to_string(), *kind))
    }

    /// Synthesize a unique name for an anonymous compound. One counter per
    /// kind, shared across the whole compilation run.
    pub fn anon_name(&mut self, kind: &'static str) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("{}{}", kind, counter)
    }

    pub fn set_message_info(&mut self, name: &str, info: MessageInfo) {
        self.messages.insert(name.to_string(), info);
    }

    pub fn message_info(&self, name: &str) -> Option<&MessageInfo> {
        self.messages.get(name)
    }

    /// Tag a derived message starts handing out, given its optional base.
    pub fn first_tag(&self, base: Option<&str>) -> u32 {
        base.and_then(|b| self.messages.get(b))
            .map(|info| info.next_tag)
            .unwrap_or(FIRST_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anon_names_count_per_kind() {
        let mut ctx = Context::new();
        assert_eq!(ctx.anon_name("bitset"), "bitset1");
        assert_eq!(ctx.anon_name("bitset"), "bitset2");
        assert_eq!(ctx.anon_name("group"), "group1");
        assert_eq!(ctx.anon_name("bitset"), "bitset3");
    }

    #[test]
    fn test_define_rejects_builtin_shadowing() {
        let mut ctx = Context::new();
        assert!(ctx.define("vec3", CompoundKind::Group, 3).is_err());
        assert!(ctx.define("Player", CompoundKind::Message, 3).is_ok());
        assert!(ctx.define("Player", CompoundKind::Group, 9).is_err());
    }

    #[test]
    fn test_alias_resolution() {
        let mut ctx = Context::new();
        ctx.define("Game::Object", CompoundKind::External, 1).unwrap();
        ctx.alias("Object".to_string(), "Game::Object".to_string());
        assert_eq!(
            ctx.resolve("Object"),
            Some(("Game::Object".to_string(), CompoundKind::External))
        );
        assert!(ctx.resolve("Missing").is_none());
    }
}
