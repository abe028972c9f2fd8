use log::{debug, info, warn};

use debate_session::builder::Builder;
use debate_session::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::sync::mpsc::Receiver;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::dashboard::config_reader::*;
use crate::dashboard::io_common::*;

pub mod config_reader;
pub mod io_common;

#[derive(Debug, Snafu)]
pub enum DashboardError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Invalid poll: {source}"))]
    InvalidPoll { source: SessionErrors },
    #[snafu(display("Unknown action {kind:?} at second {second}"))]
    UnknownAction { kind: String, second: u32 },
    #[snafu(display("Action {kind} at second {second} needs the field {field:?}"))]
    MissingActionField {
        kind: String,
        second: u32,
        field: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DashboardResult<T> = Result<T, DashboardError>;

/// A clock that never waits: every poll is one more second.
struct SimulatedSeconds;

impl TickSource for SimulatedSeconds {
    fn poll(&mut self) -> Option<u32> {
        Some(1)
    }
}

// Everything the user sees on the dashboard while the scenario runs.
struct DashboardRun {
    session: VotingSession,
    pipeline: UploadPipeline<SimulatedTransport>,
    vote_transport: Box<dyn VoteTransport>,
    upload_events: Receiver<UploadEvent>,
    ticks_per_second: u32,
    commits: Vec<JSValue>,
    errors: Vec<String>,
}

impl DashboardRun {
    fn new(config: &DashboardConfig) -> DashboardResult<DashboardRun> {
        let session = build_session(config)?;
        let rules = config.upload_rules();

        let mut transport = SimulatedTransport::new(rules.step_percent);
        let admitted_later = config
            .actions
            .iter()
            .flatten()
            .filter_map(|a| a.files.as_ref())
            .flatten();
        for u in config.uploads.iter().flatten().chain(admitted_later) {
            if let Some(pct) = u.fail_at_percent {
                transport = transport.fail_file(&simplify_file_name(&u.name), pct);
            }
        }

        let vote_transport: Box<dyn VoteTransport> = match config.vote_transport_mode()? {
            VoteTransportMode::Accept => Box::new(AcceptingVoteTransport),
            VoteTransportMode::Reject => Box::new(RejectingVoteTransport {
                reason: "the vote service is unavailable".to_string(),
            }),
        };

        let mut pipeline = UploadPipeline::new(&rules, transport);
        let upload_events = pipeline.subscribe();
        let initial = to_file_handles(&config.uploads.clone().unwrap_or_default());
        if !initial.is_empty() {
            pipeline.admit(&initial);
        }

        Ok(DashboardRun {
            session,
            pipeline,
            vote_transport,
            upload_events,
            ticks_per_second: (1000 / rules.step_millis).max(1) as u32,
            commits: Vec::new(),
            errors: Vec::new(),
        })
    }

    fn apply(&mut self, second: u32, action: &Action) {
        debug!("apply: second {}: {:?}", second, action);
        match action {
            Action::Commit(option) => {
                let outcome = self
                    .session
                    .commit_with(option, self.vote_transport.as_mut());
                let label = match outcome {
                    Ok(CommitOutcome::Accepted) => "accepted".to_string(),
                    Ok(CommitOutcome::AcceptedUnconfirmed(_)) => "accepted, unconfirmed".to_string(),
                    Ok(CommitOutcome::Rejected(RejectReason::AlreadyCommitted)) => {
                        "rejected: already committed".to_string()
                    }
                    Ok(CommitOutcome::Rejected(RejectReason::Closed)) => {
                        "rejected: voting closed".to_string()
                    }
                    Err(e) => {
                        warn!("apply: second {}: {}", second, e);
                        self.errors.push(format!("second {}: {}", second, e));
                        "invalid option".to_string()
                    }
                };
                self.commits.push(json!({
                    "atSecond": second,
                    "option": option,
                    "outcome": label,
                }));
            }
            Action::Remove(file) => {
                let name = simplify_file_name(file);
                let id = self.upload_named(&name);
                match id {
                    Some(id) => {
                        if let Err(e) = self.pipeline.remove(id) {
                            self.errors.push(format!("second {}: {}", second, e));
                        }
                    }
                    None => {
                        warn!("apply: second {}: nothing to remove for {}", second, name);
                        self.errors
                            .push(format!("second {}: no upload named {:?}", second, name));
                    }
                }
            }
            Action::Admit(files) => {
                self.pipeline.admit(&to_file_handles(files));
            }
            Action::Clear => {
                self.pipeline.clear();
            }
        }
    }

    // Among uploads sharing a name, the one in flight goes first, then the
    // oldest pending one, then the oldest finished one.
    fn upload_named(&self, name: &str) -> Option<UploadId> {
        let named: Vec<&UploadItem> = self
            .pipeline
            .items()
            .iter()
            .filter(|it| it.name == name)
            .collect();
        named
            .iter()
            .find(|it| it.status == UploadStatus::InProgress)
            .or_else(|| named.iter().find(|it| it.status == UploadStatus::Pending))
            .or_else(|| named.first())
            .map(|it| it.id)
    }

    fn is_settled(&self) -> bool {
        self.session.is_settled() && self.pipeline.is_settled()
    }

    fn advance(&mut self, seconds: u32) {
        self.pipeline
            .tick_by(seconds.saturating_mul(self.ticks_per_second));
        self.session.tick_by(seconds);
        for ev in self.upload_events.try_iter() {
            debug!("upload event: {:?}", ev);
        }
    }

    fn summary(&self, elapsed: u32) -> JSValue {
        let s = &self.session;
        let results = s.summary();
        let options: Vec<JSValue> = s
            .options()
            .iter()
            .map(|o| {
                json!({
                    "id": o.id,
                    "label": o.label,
                    "votes": o.votes,
                    "percentage": s.percentage(&o.id).unwrap_or(0),
                })
            })
            .collect();

        let items: Vec<JSValue> = self
            .pipeline
            .items()
            .iter()
            .map(|it| {
                json!({
                    "name": it.name,
                    "sizeLabel": format_file_size(it.size_bytes),
                    "kind": it.mime_class.label(),
                    "status": it.status.label(),
                    "percent": it.percent_complete,
                    "failure": it.failure,
                })
            })
            .collect();
        let finish_order: Vec<String> = self
            .pipeline
            .finished_order()
            .iter()
            .filter_map(|id| self.pipeline.get(*id).map(|it| it.name.clone()))
            .collect();

        json!({
            "elapsedSeconds": elapsed,
            "poll": {
                "question": s.question(),
                "status": s.status().label(),
                "totalVotes": results.total_votes,
                "committedOption": s.committed_option(),
                "leading": results.leading_option,
                "leadingPercentage": results.leading_percentage,
                "remaining": results.remaining,
                "notice": s.notice(),
                "options": options,
            },
            "commits": self.commits,
            "uploads": {
                "items": items,
                "finishOrder": finish_order,
                "readyForAnalysis": self.pipeline.all_completed(),
            },
            "errors": self.errors,
        })
    }
}

fn build_session(config: &DashboardConfig) -> DashboardResult<VotingSession> {
    let mut builder = Builder::new(&config.session_rules())
        .context(InvalidPollSnafu {})?
        .question(&config.poll.question);
    for o in config.poll.options.iter() {
        builder
            .add_option(&o.id, &o.label, o.votes.unwrap_or(0))
            .context(InvalidPollSnafu {})?;
    }
    builder.build().context(InvalidPollSnafu {})
}

/// Replays the scenario on the given clock and returns its summary.
///
/// Each second, the actions due are applied first, then the uploads and the
/// countdown move on. The run ends once the last action has been applied and
/// both the poll and the uploads have nothing left to do, or when the clock
/// stops. Actions falling inside coalesced seconds are applied late, which
/// may turn a vote away if the countdown expired meanwhile.
pub fn simulate(config: &DashboardConfig, clock: &mut dyn TickSource) -> DashboardResult<JSValue> {
    let actions = config.sorted_actions()?;
    let last_action_second = actions.last().map(|(s, _)| *s).unwrap_or(0);
    let mut run = DashboardRun::new(config)?;

    let mut next_action = 0;
    let mut second: u32 = 0;
    loop {
        while next_action < actions.len() && actions[next_action].0 <= second {
            run.apply(second, &actions[next_action].1);
            next_action += 1;
        }
        if second >= last_action_second && run.is_settled() {
            break;
        }
        let n = match clock.poll() {
            Some(n) => n,
            None => {
                warn!("simulate: the clock stopped at second {}", second);
                break;
            }
        };
        run.advance(n);
        second = second.saturating_add(n);
    }
    info!(
        "simulate: finished after {} seconds, poll {:?}",
        second,
        run.session.status()
    );
    Ok(run.summary(second))
}

fn write_summary(out: Option<String>, pretty_js: &str) -> DashboardResult<()> {
    match out {
        Some(path) if path != "stdout" => {
            fs::write(path.clone(), pretty_js).context(WritingSummarySnafu { path })?;
        }
        _ => {
            println!("{}", pretty_js);
        }
    }
    Ok(())
}

pub fn run_dashboard(
    config_path: String,
    check_summary_path: Option<String>,
    out: Option<String>,
    realtime: bool,
) -> DashboardResult<()> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    let result_js = if realtime {
        let mut clock = IntervalTicks::from_millis(config.session_rules().tick_millis);
        simulate(&config, &mut clock)?
    } else {
        simulate(&config, &mut SimulatedSeconds)?
    };

    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_summary(out, &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        debug!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between the computed summary and the reference summary");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_scenario_test(test_name: &str, config_lpath: &str, summary_lpath: &str) {
        let test_dir = option_env!("DEBATEPULSE_TEST_DIR")
            .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"));
        info!("Running test {}", test_name);
        let res = run_dashboard(
            format!("{}/{}/{}", test_dir, test_name, config_lpath),
            Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
            None,
            false,
        );
        if let Err(e) = res {
            panic!("scenario {} failed: {}", test_name, e);
        }
    }

    fn test_wrapper(test_name: &str) {
        run_scenario_test(
            test_name,
            format!("{}_config.json", test_name).as_str(),
            format!("{}_expected_summary.json", test_name).as_str(),
        )
    }

    fn climate_config(extra: &str) -> DashboardConfig {
        let js = format!(
            r#"{{
                "poll": {{
                    "question": "Do you support immediate climate action despite economic costs?",
                    "options": [
                        {{"id": "yes", "label": "Yes, climate action is urgent", "votes": 1247}},
                        {{"id": "no", "label": "No, economic impact is too high", "votes": 763}}
                    ]
                }}{}
            }}"#,
            extra
        );
        serde_json::from_str(&js).unwrap()
    }

    #[test]
    fn climate_commit() {
        test_wrapper("climate_commit");
    }

    #[test]
    fn expired_with_uploads() {
        test_wrapper("expired_with_uploads");
    }

    #[test]
    fn rejected_vote_raises_a_notice() {
        let config = climate_config(
            r#", "voteTransport": "reject",
                "actions": [{"atSecond": 10, "kind": "commit", "option": "no"}]"#,
        );
        let js = simulate(&config, &mut SimulatedSeconds).unwrap();
        assert_eq!(js["poll"]["totalVotes"], json!(2011));
        assert_eq!(js["poll"]["committedOption"], json!("no"));
        assert_eq!(js["poll"]["status"], json!("committed"));
        assert_eq!(
            js["poll"]["notice"],
            json!("Your vote could not be confirmed: the vote service is unavailable")
        );
        assert_eq!(js["commits"][0]["outcome"], json!("accepted, unconfirmed"));
    }

    #[test]
    fn coalesced_seconds_let_the_countdown_win() {
        let config = climate_config(
            r#", "actions": [{"atSecond": 150, "kind": "commit", "option": "yes"}]"#,
        );
        let mut clock = ManualTicks::new();
        clock.push(400);
        let js = simulate(&config, &mut clock).unwrap();
        assert_eq!(js["elapsedSeconds"], json!(400));
        assert_eq!(js["poll"]["status"], json!("closed"));
        assert_eq!(js["poll"]["totalVotes"], json!(2010));
        assert_eq!(js["commits"][0]["atSecond"], json!(400));
        assert_eq!(js["commits"][0]["outcome"], json!("rejected: voting closed"));
    }

    #[test]
    fn run_stops_with_the_clock() {
        let config = climate_config("");
        let js = simulate(&config, &mut ManualTicks::steps(10)).unwrap();
        assert_eq!(js["elapsedSeconds"], json!(10));
        assert_eq!(js["poll"]["status"], json!("open"));
        assert_eq!(js["poll"]["remaining"], json!("4:50"));
    }

    #[test]
    fn admit_and_clear_actions() {
        let config = climate_config(
            r#", "actions": [
                    {"atSecond": 1, "kind": "admit", "files": [
                        {"name": "/home/me/opening.mp4", "size": 2048, "type": "video/mp4"},
                        {"name": "rebuttal.mp4", "size": 2048, "type": "video/mp4"}
                    ]},
                    {"atSecond": 3, "kind": "clear"},
                    {"atSecond": 4, "kind": "admit", "files": [
                        {"name": "closing.txt", "size": 12, "type": "text/plain"}
                    ]},
                    {"atSecond": 4, "kind": "remove", "file": "opening.mp4"}
                ]"#,
        );
        let js = simulate(&config, &mut ManualTicks::steps(400)).unwrap();
        let items = js["uploads"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], json!("closing.txt"));
        assert_eq!(items[0]["status"], json!("completed"));
        assert_eq!(items[0]["kind"], json!("text"));
        assert_eq!(js["uploads"]["readyForAnalysis"], json!(true));
        assert_eq!(
            js["errors"],
            json!(["second 4: no upload named \"opening.mp4\""])
        );
    }

    #[test]
    fn one_huge_batch_of_seconds() {
        let config = climate_config(
            r#", "uploads": [{"name": "clip.mp3", "size": 1024, "type": "audio/mpeg"}],
                "actions": [{"atSecond": 20, "kind": "commit", "option": "yes"}]"#,
        );
        let mut clock = ManualTicks::new();
        clock.push(1_000_000_000);
        let js = simulate(&config, &mut clock).unwrap();
        assert_eq!(js["elapsedSeconds"], json!(1_000_000_000));
        assert_eq!(js["poll"]["status"], json!("closed"));
        assert_eq!(js["poll"]["remaining"], json!("0:00"));
        assert_eq!(js["uploads"]["items"][0]["status"], json!("completed"));
        assert_eq!(js["commits"][0]["outcome"], json!("rejected: voting closed"));
    }

    #[test]
    fn huge_tallies_are_summarised() {
        let config: DashboardConfig = serde_json::from_str(
            r#"{"poll": {"question": "q", "options": [
                {"id": "a", "label": "A", "votes": 100000000000000000},
                {"id": "b", "label": "B", "votes": 100000000000000000}]}}"#,
        )
        .unwrap();
        let js = simulate(&config, &mut ManualTicks::steps(1)).unwrap();
        assert_eq!(js["poll"]["options"][0]["percentage"], json!(50));
        assert_eq!(js["poll"]["leading"], json!("a"));
    }

    #[test]
    fn remove_prefers_the_upload_in_flight() {
        let config = climate_config(
            r#", "uploads": [
                    {"name": "clip.mp3", "size": 1024, "type": "audio/mpeg"}
                ]"#,
        );
        let mut run = DashboardRun::new(&config).unwrap();
        run.advance(2);
        let first = run.pipeline.items()[0].id;
        assert_eq!(run.pipeline.get(first).unwrap().status, UploadStatus::Completed);

        let clip = UploadConfig {
            name: "clip.mp3".to_string(),
            size: 1024,
            mime_type: "audio/mpeg".to_string(),
            fail_at_percent: None,
        };
        run.apply(2, &Action::Admit(vec![clip.clone(), clip]));
        let queued: Vec<UploadId> = run.pipeline.items()[1..].iter().map(|it| it.id).collect();
        assert_eq!(run.pipeline.active().unwrap().id, queued[0]);

        // The finished upload with the same name is left alone.
        run.apply(2, &Action::Remove("clip.mp3".to_string()));
        assert_eq!(run.pipeline.active().unwrap().id, queued[1]);
        run.apply(2, &Action::Remove("clip.mp3".to_string()));
        let left: Vec<UploadId> = run.pipeline.items().iter().map(|it| it.id).collect();
        assert_eq!(left, vec![first]);
        assert!(run.pipeline.is_idle());
        assert!(run.errors.is_empty());
    }

    #[test]
    fn duplicate_options_are_rejected() {
        let config: DashboardConfig = serde_json::from_str(
            r#"{"poll": {"question": "q", "options": [
                {"id": "a", "label": "A"}, {"id": "a", "label": "B"}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            simulate(&config, &mut SimulatedSeconds),
            Err(DashboardError::InvalidPoll { .. })
        ));
    }
}
