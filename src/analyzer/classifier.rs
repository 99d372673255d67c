use crate::config::ConventionalCommitsConfig;
use crate::domain::{ParsedCommit, VersionBump};
use crate::git::CommitInfo;

/// A commit together with what it means for the next version
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedCommit {
    pub info: CommitInfo,
    pub parsed: Option<ParsedCommit>,
    pub is_breaking: bool,
    pub bump: VersionBump,
}

/// Classifies commit messages into version increments
#[derive(Debug, Clone)]
pub struct CommitClassifier {
    config: ConventionalCommitsConfig,
}

impl CommitClassifier {
    /// Create a new classifier
    pub fn new(config: ConventionalCommitsConfig) -> Self {
        CommitClassifier { config }
    }

    /// Increment implied by a single message.
    ///
    /// Messages that are not conventional commits contribute `None`; a
    /// breaking marker or indicator always wins over the type table.
    pub fn classify(&self, message: &str) -> VersionBump {
        match ParsedCommit::parse(message) {
            Some(parsed) => self.classify_parsed(&parsed, message).1,
            None => VersionBump::None,
        }
    }

    pub fn classify_commit(&self, info: CommitInfo) -> ClassifiedCommit {
        let parsed = ParsedCommit::parse(&info.message);
        let (is_breaking, bump) = match &parsed {
            Some(p) => self.classify_parsed(p, &info.message),
            None => (false, VersionBump::None),
        };

        ClassifiedCommit {
            info,
            parsed,
            is_breaking,
            bump,
        }
    }

    fn classify_parsed(&self, parsed: &ParsedCommit, message: &str) -> (bool, VersionBump) {
        let is_breaking = parsed.has_breaking_marker
            || self
                .config
                .breaking_change_indicators
                .iter()
                .any(|indicator| message.contains(indicator.as_str()));

        if is_breaking {
            return (true, VersionBump::Major);
        }

        let bump = self
            .config
            .types
            .get(&parsed.r#type)
            .copied()
            .unwrap_or(VersionBump::None);

        (false, bump)
    }

    /// Fold messages with `max`; may be `None`
    pub fn analyze_messages(&self, messages: &[String]) -> VersionBump {
        messages
            .iter()
            .map(|message| self.classify(message))
            .max()
            .unwrap_or(VersionBump::None)
    }

    /// Fold a classified range, falling back to `default_bump` when nothing
    /// in it implies an increment (including an empty range).
    pub fn determine_bump(
        &self,
        commits: &[ClassifiedCommit],
        default_bump: VersionBump,
    ) -> VersionBump {
        let folded = commits
            .iter()
            .map(|c| c.bump)
            .max()
            .unwrap_or(VersionBump::None);

        if folded == VersionBump::None {
            default_bump
        } else {
            folded
        }
    }
}

impl Default for CommitClassifier {
    fn default() -> Self {
        Self::new(ConventionalCommitsConfig::default())
    }
}
