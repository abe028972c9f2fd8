pub use crate::config::*;
use crate::voting::VotingSession;

/// A builder for voting sessions.
///
/// ```
/// pub use debate_session::builder::Builder;
/// pub use debate_session::SessionRules;
/// # use debate_session::SessionErrors;
///
/// let mut builder = Builder::new(&SessionRules::DEFAULT_RULES)?
///     .question("Do you support immediate climate action despite economic costs?");
///
/// builder.add_option("yes", "Yes, climate action is urgent", 1247)?;
/// builder.add_option("no", "No, economic impact is too high", 763)?;
///
/// let session = builder.build()?;
/// assert_eq!(session.total_votes(), 2010);
///
/// # Ok::<(), SessionErrors>(())
/// ```
pub struct Builder {
    pub(crate) _rules: SessionRules,
    pub(crate) _question: String,
    pub(crate) _options: Vec<PollOption>,
}

impl Builder {
    pub fn new(rules: &SessionRules) -> Result<Builder, SessionErrors> {
        Ok(Builder {
            _rules: rules.clone(),
            _question: String::new(),
            _options: Vec::new(),
        })
    }

    pub fn question(self, question: &str) -> Builder {
        Builder {
            _question: question.to_string(),
            ..self
        }
    }

    /// Overrides the length of the voting window.
    pub fn window_seconds(self, seconds: u32) -> Builder {
        Builder {
            _rules: SessionRules {
                window_seconds: seconds,
                ..self._rules
            },
            ..self
        }
    }

    /// Adds an option with the number of votes it already has.
    ///
    /// The id must not have been used by a previous option.
    pub fn add_option(&mut self, id: &str, label: &str, votes: u64) -> Result<(), SessionErrors> {
        self.add_option_2(&PollOption {
            id: id.to_string(),
            label: label.to_string(),
            votes,
        })
    }

    pub fn add_option_2(&mut self, option: &PollOption) -> Result<(), SessionErrors> {
        if self._options.iter().any(|o| o.id == option.id) {
            return Err(SessionErrors::DuplicateOption(option.id.clone()));
        }
        self._options.push(option.clone());
        Ok(())
    }

    pub fn build(&self) -> Result<VotingSession, SessionErrors> {
        VotingSession::new(&self._question, &self._options, &self._rules)
    }
}
