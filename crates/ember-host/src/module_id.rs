use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

/// Identity of one compiled module: the name recorded in its image and the
/// key of its execution context.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Hash)]
pub struct ModuleId(String);

impl ModuleId {
    /// A fresh random identifier. Never repeats within a process.
    pub fn generate() -> Self {
        ModuleId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(name: &str) -> Self {
        ModuleId(name.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(name: String) -> Self {
        ModuleId(name)
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let ids = (0..256).map(|_| ModuleId::generate()).collect::<FxHashSet<_>>();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn test_generate_format() {
        let id = ModuleId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
