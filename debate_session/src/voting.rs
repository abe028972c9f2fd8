use log::{debug, info, warn};

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::*;
use crate::driver::Tickable;

/// The collaborator persisting a vote once it has been counted locally.
pub trait VoteTransport {
    fn submit(&mut self, option_id: &str) -> Result<(), String>;
}

/// Confirms every vote.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptingVoteTransport;

impl VoteTransport for AcceptingVoteTransport {
    fn submit(&mut self, _option_id: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Refuses every vote with the same reason.
#[derive(Debug, Clone)]
pub struct RejectingVoteTransport {
    pub reason: String,
}

impl VoteTransport for RejectingVoteTransport {
    fn submit(&mut self, _option_id: &str) -> Result<(), String> {
        Err(self.reason.clone())
    }
}

/// A single poll with a countdown and at most one counted vote.
///
/// The total is always recomputed from the options, so it cannot drift from
/// the per-option counts.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VotingSession {
    question: String,
    options: Vec<PollOption>,
    remaining_seconds: u32,
    committed: Option<String>,
    notice: Option<String>,
}

impl VotingSession {
    /// Creates an open session from an initial tally snapshot.
    ///
    /// Option ids must be unique and there must be at least one option.
    pub fn new(
        question: &str,
        options: &[PollOption],
        rules: &SessionRules,
    ) -> Result<VotingSession, SessionErrors> {
        if options.is_empty() {
            return Err(SessionErrors::EmptyPoll);
        }
        for (idx, o) in options.iter().enumerate() {
            if options[..idx].iter().any(|prev| prev.id == o.id) {
                return Err(SessionErrors::DuplicateOption(o.id.clone()));
            }
        }
        info!(
            "VotingSession::new: {:?} with {} options, window {}s",
            question,
            options.len(),
            rules.window_seconds
        );
        Ok(VotingSession {
            question: question.to_string(),
            options: options.to_vec(),
            remaining_seconds: rules.window_seconds,
            committed: None,
            notice: None,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn total_votes(&self) -> u64 {
        self.options
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.votes))
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn committed_option(&self) -> Option<&str> {
        self.committed.as_deref()
    }

    /// Set when the vote transport refused a vote that was already counted.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// A commit takes precedence over the expiry of the countdown.
    pub fn status(&self) -> SessionStatus {
        if self.committed.is_some() {
            SessionStatus::Committed
        } else if self.remaining_seconds == 0 {
            SessionStatus::Closed
        } else {
            SessionStatus::Open
        }
    }

    /// Casts the vote of this session.
    ///
    /// Only the first commit made while the session is open is counted. Later
    /// attempts, and attempts after the countdown reached zero, are rejected
    /// without touching the tally. An unknown option is an error and changes
    /// nothing either.
    pub fn commit(&mut self, option_id: &str) -> Result<CommitOutcome, SessionErrors> {
        match self.status() {
            SessionStatus::Committed => {
                debug!("commit: {:?} rejected, already committed", option_id);
                return Ok(CommitOutcome::Rejected(RejectReason::AlreadyCommitted));
            }
            SessionStatus::Closed => {
                debug!("commit: {:?} rejected, voting closed", option_id);
                return Ok(CommitOutcome::Rejected(RejectReason::Closed));
            }
            SessionStatus::Open => {}
        }
        let option = self
            .options
            .iter_mut()
            .find(|o| o.id == option_id)
            .ok_or_else(|| SessionErrors::InvalidOption(option_id.to_string()))?;
        option.votes = option.votes.saturating_add(1);
        self.committed = Some(option_id.to_string());
        info!(
            "commit: vote for {:?} counted with {}s left, total {}",
            option_id,
            self.remaining_seconds,
            self.total_votes()
        );
        Ok(CommitOutcome::Accepted)
    }

    /// Commits locally, then hands the vote to the transport.
    ///
    /// The local commit is never rolled back: a refusal from the transport
    /// only raises a session notice.
    pub fn commit_with<V: VoteTransport + ?Sized>(
        &mut self,
        option_id: &str,
        transport: &mut V,
    ) -> Result<CommitOutcome, SessionErrors> {
        let outcome = self.commit(option_id)?;
        if outcome != CommitOutcome::Accepted {
            return Ok(outcome);
        }
        match transport.submit(option_id) {
            Ok(()) => Ok(CommitOutcome::Accepted),
            Err(reason) => {
                warn!("commit_with: vote transport refused {:?}: {}", option_id, reason);
                self.notice = Some(format!("Your vote could not be confirmed: {}", reason));
                Ok(CommitOutcome::AcceptedUnconfirmed(reason))
            }
        }
    }

    /// Share of the votes for this option, rounded to the nearest integer
    /// (halves round up). Zero while nobody voted.
    pub fn percentage(&self, option_id: &str) -> Result<u32, SessionErrors> {
        let option = self
            .option(option_id)
            .ok_or_else(|| SessionErrors::InvalidOption(option_id.to_string()))?;
        Ok(rounded_share(option.votes, self.total_votes()))
    }

    /// The option with the most votes. Ties go to the one listed first.
    pub fn leading_option(&self) -> Option<&PollOption> {
        let mut best: Option<&PollOption> = None;
        for o in self.options.iter() {
            match best {
                Some(b) if b.votes >= o.votes => {}
                _ => best = Some(o),
            }
        }
        best
    }

    pub fn summary(&self) -> SessionSummary {
        let leading = self.leading_option();
        SessionSummary {
            total_votes: self.total_votes(),
            leading_option: leading.map(|o| o.id.clone()),
            leading_percentage: leading
                .map(|o| rounded_share(o.votes, self.total_votes()))
                .unwrap_or(0),
            remaining: format_remaining(self.remaining_seconds),
        }
    }
}

impl Tickable for VotingSession {
    fn tick(&mut self) {
        self.tick_by(1);
    }

    fn tick_by(&mut self, n: u32) {
        if self.remaining_seconds == 0 {
            return;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(n);
        if self.remaining_seconds == 0 {
            info!("countdown expired, session is {:?}", self.status());
        }
    }

    fn is_settled(&self) -> bool {
        self.remaining_seconds == 0
    }
}

fn rounded_share(votes: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let (votes, total) = (votes as u128, total as u128);
    ((200 * votes + total) / (2 * total)) as u32
}

/// Formats a number of seconds as `m:ss`.
pub fn format_remaining(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// A voting session that several callers may use at the same time.
///
/// The status check and the increment of a commit happen under one lock,
/// so two racing commits can never both be counted.
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<VotingSession>>,
}

impl SharedSession {
    pub fn new(session: VotingSession) -> SharedSession {
        SharedSession {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn commit(&self, option_id: &str) -> Result<CommitOutcome, SessionErrors> {
        self.lock().commit(option_id)
    }

    pub fn tick(&self) {
        self.lock().tick();
    }

    pub fn snapshot(&self) -> VotingSession {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, VotingSession> {
        // A panic in another holder cannot leave a half-applied commit behind.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
