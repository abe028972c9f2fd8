use crate::dashboard::*;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OptionConfig {
    pub id: String,
    pub label: String,
    pub votes: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub question: String,
    #[serde(rename = "windowSeconds")]
    pub window_seconds: Option<u32>,
    pub options: Vec<OptionConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(rename = "failAtPercent")]
    pub fail_at_percent: Option<u8>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(rename = "maxFileBytes")]
    pub max_file_bytes: Option<u64>,
    #[serde(rename = "uploadStepMillis")]
    pub upload_step_millis: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "atSecond")]
    pub at_second: u32,
    pub kind: String,
    pub option: Option<String>,
    pub file: Option<String>,
    pub files: Option<Vec<UploadConfig>>,
}

/// What the user does at a given second of the scenario.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Action {
    Commit(String),
    Remove(String),
    Admit(Vec<UploadConfig>),
    Clear,
}

impl ActionConfig {
    pub fn action(&self) -> DashboardResult<Action> {
        let second = self.at_second;
        match self.kind.as_str() {
            "commit" => {
                let option = self.option.clone().context(MissingActionFieldSnafu {
                    kind: "commit",
                    second,
                    field: "option",
                })?;
                Ok(Action::Commit(option))
            }
            "remove" => {
                let file = self.file.clone().context(MissingActionFieldSnafu {
                    kind: "remove",
                    second,
                    field: "file",
                })?;
                Ok(Action::Remove(file))
            }
            "admit" => {
                let files = self.files.clone().context(MissingActionFieldSnafu {
                    kind: "admit",
                    second,
                    field: "files",
                })?;
                Ok(Action::Admit(files))
            }
            "clear" => Ok(Action::Clear),
            x => UnknownActionSnafu {
                kind: x.to_string(),
                second,
            }
            .fail(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum VoteTransportMode {
    Accept,
    Reject,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub poll: PollConfig,
    pub uploads: Option<Vec<UploadConfig>>,
    pub limits: Option<LimitsConfig>,
    pub actions: Option<Vec<ActionConfig>>,
    #[serde(rename = "voteTransport")]
    pub vote_transport: Option<String>,
}

impl DashboardConfig {
    pub fn vote_transport_mode(&self) -> DashboardResult<VoteTransportMode> {
        match self.vote_transport.as_deref() {
            None | Some("accept") => Ok(VoteTransportMode::Accept),
            Some("reject") => Ok(VoteTransportMode::Reject),
            Some(x) => {
                whatever!("unknown vote transport: {}", x);
            }
        }
    }

    pub fn upload_rules(&self) -> UploadRules {
        let limits = self.limits.clone();
        UploadRules {
            max_file_bytes: Some(
                limits
                    .as_ref()
                    .and_then(|l| l.max_file_bytes)
                    .unwrap_or(UploadRules::DASHBOARD_MAX_FILE_BYTES),
            ),
            step_millis: limits
                .as_ref()
                .and_then(|l| l.upload_step_millis)
                .filter(|ms| *ms > 0)
                .unwrap_or(UploadRules::DEFAULT_RULES.step_millis),
            ..UploadRules::DEFAULT_RULES
        }
    }

    pub fn session_rules(&self) -> SessionRules {
        SessionRules {
            window_seconds: self
                .poll
                .window_seconds
                .unwrap_or(SessionRules::DEFAULT_RULES.window_seconds),
            ..SessionRules::DEFAULT_RULES
        }
    }

    /// The actions in the order they are applied: by second, then as listed.
    pub fn sorted_actions(&self) -> DashboardResult<Vec<(u32, Action)>> {
        let mut res: Vec<(u32, Action)> = Vec::new();
        for a in self.actions.clone().unwrap_or_default() {
            res.push((a.at_second, a.action()?));
        }
        // Stable sort keeps the listed order within one second.
        res.sort_by_key(|(second, _)| *second);
        Ok(res)
    }
}

pub fn read_config(path: String) -> DashboardResult<DashboardConfig> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let config: DashboardConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(config)
}

pub fn read_summary(path: String) -> DashboardResult<JSValue> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}
