//! File picker filter for log files.

use std::path::Path;

/// Accepts directories (so pickers can navigate) and `.txt` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFilter;

impl LogFilter {
    pub const DESCRIPTION: &'static str = "Log files (.txt)";

    pub fn accept(&self, path: &Path) -> bool {
        path.is_dir()
            || path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".txt"))
    }

    pub fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_txt_files() {
        assert!(LogFilter.accept(Path::new("Logs/WoWCombatLog.txt")));
        assert!(LogFilter.accept(Path::new("a.b.txt")));
    }

    #[test]
    fn rejects_other_extensions() {
        assert!(!LogFilter.accept(Path::new("server.log")));
        assert!(!LogFilter.accept(Path::new("notes.TXT")));
        assert!(!LogFilter.accept(Path::new("txt")));
    }

    #[test]
    fn accepts_directories() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(LogFilter.accept(tmp.path()));
    }

    #[test]
    fn description_text() {
        assert_eq!(LogFilter.description(), "Log files (.txt)");
    }
}
