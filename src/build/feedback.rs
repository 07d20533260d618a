use colored::*;

/// Turns compiler and resolver failures into a hint for the user.
pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    pub fn analyze(output: &str) -> Option<String> {
        // Missing package: usually a dependency that is not on the class path
        if output.contains("package ") && output.contains("does not exist") {
            return Some(format!(
                "A {} could not be found.\nAdd the archive to {} or declare the dependency in {}.",
                "package".bold().yellow(),
                "CLASSPATH".bold().green(),
                "pom.xml".bold().green()
            ));
        }

        if output.contains("cannot find symbol") {
            return Some(format!(
                "It looks like a {} error.\nCheck the class path of the rule with {}.",
                "Missing Symbol".bold().red(),
                "fake show-vars".bold().green()
            ));
        }

        if output.contains("invalid target release") || output.contains("invalid source release") {
            return Some(format!(
                "The compiler does not support the requested {}.\nLower {} or the compiler plugin's source/target.",
                "language level".bold().yellow(),
                "JAVAVERSION".bold().green()
            ));
        }

        if output.contains("checksum mismatch") {
            return Some(format!(
                "A downloaded file did not match its {} side-car.\nNothing was cached; retry, or try another repository.",
                ".sha1".bold().yellow()
            ));
        }

        if output.contains("offline mode") {
            return Some(format!(
                "The artifact is not in the local repository.\nRun once without {} to download it.",
                "--offline".bold().green()
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_package() {
        let err = "A.java:1: error: package org.junit does not exist";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("CLASSPATH"));
    }

    #[test]
    fn test_language_level() {
        let err = "error: invalid target release: 1.3";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("JAVAVERSION"));
    }

    #[test]
    fn test_offline_hint() {
        let msg = FeedbackAnalyzer::analyze("offline mode: refusing to fetch x").unwrap();
        assert!(msg.contains("--offline"));
        assert!(FeedbackAnalyzer::analyze("all good").is_none());
    }
}
