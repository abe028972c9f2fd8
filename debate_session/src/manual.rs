/*!

This is the long-form manual for `debate_session` and `debatepulse`.

## Upload pipeline

Files are admitted in batches, as they come from a file picker or a
drag-and-drop payload. Only the name, the size and the MIME type of a file are
read. Each file becomes one item:

| status       | meaning                                                 |
|--------------|---------------------------------------------------------|
| `Pending`    | waiting in the queue                                    |
| `InProgress` | being uploaded (at most one item at a time)             |
| `Completed`  | the transport reached 100%                              |
| `Failed`     | the transport reported an error, or the file was too big |

Items are processed strictly in admission order. A failed item does not stop
the queue and is never retried automatically. Removing the item being
uploaded abandons it: its transport is cancelled and the next pending item
starts right away.

The simulated transport gains 10 points per tick. The dashboard uses one
tick every 200 ms, so a file takes two seconds.

## Voting session

A session starts `Open` with a countdown (300 seconds by default) and an
initial tally. The first vote cast while open is counted and the session
becomes `Committed`; any later vote is rejected. When the countdown reaches
zero without a vote, the session becomes `Closed`. A vote arriving after the
countdown reached zero is rejected, even if the voter clicked before.

Percentages are rounded to the nearest integer, halves rounding up. The
leading option is the one with the most votes; on a tie, the one listed first.

When a vote transport refuses a vote, the vote stays counted and the session
carries a notice for the voter.

## `debatepulse` configuration

The command line tool replays a dashboard scenario described in JSON:

```json
{
  "poll": {
    "question": "Do you support immediate climate action despite economic costs?",
    "windowSeconds": 300,
    "options": [
      { "id": "yes", "label": "Yes, climate action is urgent", "votes": 1247 },
      { "id": "no", "label": "No, economic impact is too high", "votes": 763 }
    ]
  },
  "uploads": [
    { "name": "clip.mp3", "size": 1024, "type": "audio/mpeg" }
  ],
  "actions": [
    { "atSecond": 150, "kind": "commit", "option": "yes" }
  ]
}
```

Optional sections:

* `limits.maxFileBytes` (default 500 MB) and `limits.uploadStepMillis`
  (default 200).
* `uploads[].failAtPercent`: the simulated transport fails this file when it
  would reach the given percentage. Failures are matched by file name, so
  they apply to every upload carrying that name.
* `actions[].kind`: `commit` (with `option`), `remove` (with `file`), `admit`
  (with `files`, same shape as `uploads`) or `clear`. When several uploads
  share the name given to `remove`, the one in flight is removed first, then
  the oldest pending one, then the oldest finished one.
* `voteTransport`: `accept` (default) or `reject`.

The summary is printed as JSON. With `--reference`, it is compared with a
previously saved summary and any difference is reported as an error.
*/
