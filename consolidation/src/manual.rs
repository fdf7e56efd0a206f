/*!

This is the long-form manual for `consolidation` and the `consolidator` command.

## Concepts

During an election count, many agents report the tally of the same polling
table and category (a *pair*), either by typing it in or by uploading a CSV
file. Some make mistakes, some lie. The engine keeps one *witness* per pair
and kind of tally, and keeps a *distrust score* per agent.

### Submissions

A submission is either a total tally (every option of the category), a
partial tally (only the main options) or a problem report (the tally sheet
could not be read). Each tally carries a fingerprint, a SHA-256 digest of its
sorted `option:votes` values, so two tallies are equal when their
fingerprints are.

### Witnesses

The store decides the witness. With `MemoryStore`:
- a CSV upload from a trusted agent becomes the witness right away;
- otherwise, once `min_coincidences` (default 2) valid tallies of the same
  kind have the same fingerprint, the earliest of them becomes the witness.
  When two groups qualify, the largest wins, then the one seen first.

The engine never picks a witness by itself.

### Scores

Scores go up with distrust. Starting from the defaults:

| event | change |
|-------|--------|
| tally different from the witness | + sum of the absolute differences per option |
| tally equal to the witness | - 10 |
| problem report on a pair with a witness | + 200 |
| identification of another table than the confirmed one | + 200 |
| identification of the confirmed table | - 10 |
| problem report discarded by a reviewer | + 200 |

A tally whose options do not match the options of the witness cannot be
compared: it is counted as a difference of 0 and a warning is logged.

When a score reaches 500, the agent is flagged: all of its submissions and
identifications are invalidated, and later ones are stored invalidated.
Clearing the flag resets the score to zero but does not bring the invalidated
records back.

## Scheduler

The scheduler runs forever, one cycle at a time:
1. it scores at most `batchSize` attachments and `batchSize` pairs that
   received a confirmation or new submissions;
2. every `roundsBeforeRebuild` cycles, it empties the work queue and fills it
   again with the pairs that have an identified tally sheet but no total
   witness; the other cycles only remove resolved pairs and add new ones;
3. it sleeps for `pauseSeconds`.

A failing cycle is logged and reported, and the next cycle runs as usual.

## Configuration file

```json
{
  "scoring": {
    "identificationMismatch": 200,
    "correctActionDiscount": 10,
    "problemOnConfirmed": 200,
    "discardedProblem": 200,
    "untrustworthyThreshold": 500
  },
  "scheduler": {
    "batchSize": 500,
    "roundsBeforeRebuild": 100,
    "pauseSeconds": 5,
    "runConsolidation": true
  },
  "minCoincidences": 2,
  "trustedAgents": [1],
  "dataSources": [
    { "provider": "json", "filePath": "dataset.json" },
    { "provider": "csv", "filePath": "upload.csv" }
  ]
}
```

Every field of `scoring` and `scheduler` is optional. Paths are relative to
the configuration file.

### `json` data sources

```json
{
  "tables": [ { "table": 1, "categories": [ { "category": 1, "priority": 1 } ] } ],
  "submissions": [
    { "table": 1, "category": 1, "agent": 3, "kind": "total",
      "votes": { "1": 120, "2": 80 }, "timestamp": 1000 }
  ],
  "identifications": [
    { "attachment": 5, "agent": 3, "status": "identified", "table": 1 }
  ],
  "discardedProblems": [ { "agent": 4, "problem": 1 } ]
}
```

`kind` is one of `total`, `partial` or `problem`. `status` is one of
`identified`, `pending` or `problem`.

### `csv` data sources

One line per option, with a header:

```text
table,category,agent,kind,option,votes
1,1,7,total,1,120
1,1,7,total,2,80
```

The lines of the same table, category, agent and kind form one submission.
Uploading again replaces the previous upload of the same agent.

*/
