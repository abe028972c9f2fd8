/*!
The interaction core of the DebatePulse dashboard.

Two state machines live here, both advanced by an injected time source:

* [`UploadPipeline`]: admits files and uploads them one at a time, in
  admission order, exposing per-item progress and status.
* [`VotingSession`]: a countdown-bounded poll accepting at most one counted
  vote, with live percentages and a leading option.

Neither reads a clock. A [`TickSource`] (wall clock or [`ManualTicks`] in
tests) is fed into them through [`drive`] or by calling `tick` directly.

```
use debate_session::*;

let mut pipeline = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
let ids = pipeline.admit(&[FileHandle::new("clip.mp3", 1024, "audio/mpeg")]);
drive(&mut ManualTicks::steps(100), &mut pipeline, 100);
assert_eq!(pipeline.get(ids[0]).unwrap().status, UploadStatus::Completed);
```
*/
mod config;

pub mod builder;
pub mod driver;
pub mod manual;
pub mod upload;
pub mod voting;

pub use crate::config::*;
pub use crate::driver::{drive, IntervalTicks, ManualTicks, TickSource, Tickable};
pub use crate::upload::{SimulatedTransport, UploadPipeline, UploadTransport};
pub use crate::voting::{
    format_remaining, AcceptingVoteTransport, RejectingVoteTransport, SharedSession,
    VoteTransport, VotingSession,
};
