//! Command registry
//!
//! Centralized registry for all available commands, built once at startup and
//! shared read-only by every connection.

use super::{admin, key, search, string, validate_arity, Command, CommandError};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new command registry and register all commands
    pub fn new() -> Self {
        let mut registry = CommandRegistry {
            commands: HashMap::new(),
        };

        // Connection/admin commands
        registry.register(Arc::new(admin::PingCommand));
        registry.register(Arc::new(admin::FlushDbCommand));

        // Register string commands
        registry.register(Arc::new(string::GetCommand));
        registry.register(Arc::new(string::SetCommand));
        registry.register(Arc::new(string::SetNxCommand));
        registry.register(Arc::new(string::GetSetCommand));
        registry.register(Arc::new(string::StrLenCommand));

        // Register key commands
        registry.register(Arc::new(key::DelCommand));
        registry.register(Arc::new(key::ExistsCommand));
        registry.register(Arc::new(key::TypeCommand));
        registry.register(Arc::new(key::RenameCommand));
        registry.register(Arc::new(key::RenameNxCommand));

        // Register search commands
        registry.register(Arc::new(search::KeysCommand));

        registry
    }

    /// Register a command
    fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_lowercase();
        self.commands.insert(name, command);
    }

    /// Get a command by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    /// Look up a command and check its arity against `argc` (name included)
    pub fn lookup(&self, name: &str, argc: usize) -> Result<Arc<dyn Command>, CommandError> {
        let name = name.to_lowercase();
        let command = self
            .commands
            .get(&name)
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand(name.clone()))?;
        if !validate_arity(command.arity(), argc) {
            return Err(CommandError::WrongArity(name));
        }
        Ok(command)
    }

    /// Check if a command exists
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    /// Get all command names
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = CommandRegistry::new();
        assert!(registry.has_command("get"));
        assert!(registry.has_command("RenameNX"));
        assert_eq!(registry.lookup("SeT", 3).unwrap().name(), "SET");
    }

    #[test]
    fn test_lookup_errors() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.lookup("NOPE", 1).err(),
            Some(CommandError::UnknownCommand("nope".into()))
        );
        assert_eq!(
            registry.lookup("GET", 3).err(),
            Some(CommandError::WrongArity("get".into()))
        );
    }

    #[test]
    fn test_builtin_arities() {
        let registry = CommandRegistry::new();
        let expected = [
            ("ping", 1),
            ("get", 2),
            ("set", 3),
            ("setnx", 3),
            ("getset", 3),
            ("strlen", 2),
            ("del", -2),
            ("exists", -2),
            ("flushdb", -1),
            ("type", 2),
            ("rename", 3),
            ("renamenx", 3),
            ("keys", 2),
        ];
        for (name, arity) in expected {
            assert_eq!(registry.get(name).unwrap().arity(), arity, "{}", name);
        }
        assert_eq!(registry.command_names().len(), expected.len());
        // SELECT belongs to the engine, not the table
        assert!(!registry.has_command("select"));
    }
}
