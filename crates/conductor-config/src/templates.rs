//! Notification message templates.
//!
//! Templates are plain text with `${namespace.name}` placeholders resolved by
//! [`MessageContext`](crate::MessageContext). Each template can be overridden
//! in the `notifications` section of `conductor.kdl`.

use serde::{Deserialize, Serialize};

const SYNC_TITLE: &str = "Code analysis - ${git.short_commit} (${quality.verdict})";

const SYNC_BODY: &str = "\
## Automated code analysis results

**Commit**: `${git.commit}`
**Completed**: ${pipeline.completed_at}
**Pipeline**: [${pipeline.id}](${pipeline.url})

### Quality metrics
- **Quality gate**: ${quality.gate}
- **Bugs**: ${quality.bugs}
- **Vulnerabilities**: ${quality.vulnerabilities}
- **Code smells**: ${quality.code_smells}
- **Coverage**: ${quality.coverage}%
- **Duplicated lines**: ${quality.duplication}%
- **Lines of code**: ${quality.lines_of_code}

[Full report](${quality.dashboard})
";

const FILE_SUCCESS: &str = "\
## External file analysis results (${quality.verdict})

**File**: `${file.name}`
**Processing**: ${pipeline.status}
**Pipeline**: [${pipeline.id}](${pipeline.url})

### Code quality
- **Quality gate**: ${quality.gate}
- **Bugs**: ${quality.bugs}
- **Vulnerabilities**: ${quality.vulnerabilities}
- **Code smells**: ${quality.code_smells}
- **Lines of code**: ${quality.lines_of_code}

[Full report](${quality.dashboard})

The decompiled sources were committed to branch `${git.branch}`.
";

const FILE_FAILURE: &str = "\
## External file processing failed

**File**: `${file.name}`
**Status**: ${pipeline.status}
**Pipeline**: [${pipeline.id}](${pipeline.url})

The file could not be processed. Check the pipeline log for details.

Likely causes:
- Unsupported file format
- The file could not be decompiled
- Code analysis failed

Contact the system administrator if the problem persists.
";

/// Templates for every message the coordinator sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplates {
    /// Subject of the summary issue created after a sync pipeline.
    pub sync_title: String,
    /// Description of the summary issue created after a sync pipeline.
    pub sync_body: String,
    /// Comment posted on the originating issue when a file was analysed.
    pub file_success: String,
    /// Comment posted on the originating issue when file processing failed.
    pub file_failure: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            sync_title: SYNC_TITLE.to_string(),
            sync_body: SYNC_BODY.to_string(),
            file_success: FILE_SUCCESS.to_string(),
            file_failure: FILE_FAILURE.to_string(),
        }
    }
}
