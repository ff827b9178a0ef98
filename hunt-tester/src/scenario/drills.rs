use anyhow::{Context, Result, bail, ensure};
use chrono::Duration;
use hunt_engine::{
    BeginOutcome, HuntError, HuntState, LevelStatus, ParticipantStore, ScanOutcome, advance_level,
};
use tokio::sync::mpsc;

use super::{Drill, DrillCtx};
use crate::harness::participant;

fn code(level: u32) -> String {
    format!("qr{level}")
}

pub struct SmokeDrill;

#[async_trait::async_trait]
impl Drill for SmokeDrill {
    fn name(&self) -> &'static str {
        "Smoke Test"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let harness = ctx.harness;
        let ctl = harness.controller();
        let total = harness.total_levels();
        let id = participant(&ctx.tag("smoke"))?;

        let snap = ctl.register(Some(&id), "Smoke Runner").await?;
        ensure!(snap.current_level == 1, "fresh record should sit at level 1");
        ensure!(!snap.completed, "fresh record must not be completed");
        ensure!(
            ctl.state(Some(&id)).await? == HuntState::NotStarted,
            "registration should not start the clock"
        );

        let begun = ctl.begin_hunt(Some(&id)).await?;
        ensure!(
            matches!(begun, BeginOutcome::Started { .. }),
            "first begin should start the hunt, got {begun:?}"
        );

        for level in 1..=total {
            let snap = ctl.snapshot(Some(&id)).await?;
            ensure!(
                snap.hint_text.is_some(),
                "level {level} should show a riddle"
            );
            harness.clock().advance(Duration::seconds(30));
            let report = ctl.submit_scan(Some(&id), &code(level)).await?;
            if ctx.verbose {
                println!("   level {level}: {:?}", report.outcome);
            }
            let expected = if level == total {
                ScanOutcome::Completed
            } else {
                ScanOutcome::Advanced { cleared: level }
            };
            ensure!(
                report.outcome == expected,
                "level {level}: expected {expected:?}, got {:?}",
                report.outcome
            );
        }

        let snap = ctl.snapshot(Some(&id)).await?;
        ensure!(snap.completed, "hunt should be complete");
        ensure!(snap.current_level == total, "completed level should clamp to {total}");
        ensure!(snap.signals_found == total, "all signals should be found");
        ensure!(snap.time_taken.is_some(), "completion should record a duration");
        ensure!(snap.hint_text.is_none(), "completed hunts show no riddle");
        ensure!(
            snap.timeline.iter().all(|s| *s == LevelStatus::Completed),
            "timeline should be fully completed"
        );
        Ok(())
    }
}

pub struct OutOfSequenceDrill;

#[async_trait::async_trait]
impl Drill for OutOfSequenceDrill {
    fn name(&self) -> &'static str {
        "Out Of Sequence"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let harness = ctx.harness;
        let ctl = harness.controller();
        let total = harness.total_levels();
        let id = harness.started_participant(&ctx.tag("skipper")).await?;

        let report = ctl.submit_scan(Some(&id), &code(total + 1)).await?;
        ensure!(
            report.outcome == ScanOutcome::Mismatch { scanned: total + 1 },
            "scanning past the end should mismatch, got {:?}",
            report.outcome
        );
        if total < 2 {
            return Ok(());
        }

        ctl.submit_scan(Some(&id), &code(1)).await?;
        let expected = ctl.snapshot(Some(&id)).await?.current_level;

        let ahead = expected + 1;
        let report = ctl.submit_scan(Some(&id), &code(ahead)).await?;
        ensure!(
            report.outcome == ScanOutcome::Mismatch { scanned: ahead },
            "skipping ahead should mismatch, got {:?}",
            report.outcome
        );
        ensure!(
            report.snapshot.current_level == expected,
            "mismatch must not move the participant"
        );

        for asserted in [ahead, 1] {
            match advance_level(ctl.store(), ctl.clock(), ctl.config(), &id, asserted).await {
                Err(HuntError::SequenceViolation { .. }) => {}
                other => bail!("asserting level {asserted} should be refused, got {other:?}"),
            }
        }
        let snap = ctl.snapshot(Some(&id)).await?;
        ensure!(
            snap.current_level == expected,
            "refused advancements must leave level {expected}, found {}",
            snap.current_level
        );
        Ok(())
    }
}

pub struct UnrecognizedPayloadDrill;

const JUNK_PAYLOADS: [&str; 6] = [
    "banana",
    "",
    "   ",
    "qr",
    "https://example.com/menu",
    "level-x",
];

#[async_trait::async_trait]
impl Drill for UnrecognizedPayloadDrill {
    fn name(&self) -> &'static str {
        "Unrecognized Payload"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let ctl = ctx.harness.controller();
        let id = ctx.harness.started_participant(&ctx.tag("junk")).await?;
        let before = ctx.harness.store().load(&id).await?;
        for payload in JUNK_PAYLOADS {
            let report = ctl.submit_scan(Some(&id), payload).await?;
            ensure!(
                report.outcome == ScanOutcome::Unrecognized,
                "{payload:?} should be unrecognized, got {:?}",
                report.outcome
            );
        }
        let after = ctx.harness.store().load(&id).await?;
        ensure!(before == after, "junk payloads must not touch the record");
        Ok(())
    }
}

pub struct DoubleBeginDrill;

#[async_trait::async_trait]
impl Drill for DoubleBeginDrill {
    fn name(&self) -> &'static str {
        "Double Begin"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let ctl = ctx.harness.controller();
        let id = participant(&ctx.tag("eager"))?;

        ensure!(
            matches!(ctl.begin_hunt(Some(&id)).await, Err(HuntError::NoRecord)),
            "begin without registration should report a missing record"
        );

        ctl.register(Some(&id), "Eager").await?;
        let BeginOutcome::Started { at } = ctl.begin_hunt(Some(&id)).await? else {
            bail!("first begin should start the hunt");
        };
        ctx.harness.clock().advance(Duration::minutes(5));
        let second = ctl.begin_hunt(Some(&id)).await?;
        ensure!(
            second == BeginOutcome::AlreadyStarted { at },
            "second begin should be a no-op, got {second:?}"
        );
        let snap = ctl.snapshot(Some(&id)).await?;
        ensure!(snap.started_at == Some(at), "start time must not move");
        Ok(())
    }
}

pub struct ConcurrentRaceDrill;

const RACERS: usize = 8;

#[async_trait::async_trait]
impl Drill for ConcurrentRaceDrill {
    fn name(&self) -> &'static str {
        "Concurrent Race"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let harness = ctx.harness;
        let id = harness.started_participant(&ctx.tag("racer")).await?;

        let mut tasks = Vec::with_capacity(RACERS);
        for _ in 0..RACERS {
            let (ctl, id) = (harness.shared(), id.clone());
            tasks.push(tokio::spawn(async move {
                ctl.submit_scan(Some(&id), "qr1").await
            }));
        }
        let mut cleared = 0;
        for task in tasks {
            let report = task.await.context("scan task panicked")??;
            match report.outcome {
                ScanOutcome::Advanced { cleared: 1 } | ScanOutcome::Completed => cleared += 1,
                ScanOutcome::Debounced
                | ScanOutcome::OutOfSequence
                | ScanOutcome::Mismatch { .. }
                | ScanOutcome::AlreadyCompleted => {}
                other => bail!("unexpected racing outcome {other:?}"),
            }
        }
        ensure!(cleared == 1, "level 1 cleared {cleared} times");

        let snap = harness.controller().snapshot(Some(&id)).await?;
        ensure!(snap.signals_found == 1, "exactly one flag should be set");

        if harness.total_levels() >= 2 {
            let mut tasks = Vec::with_capacity(2);
            for _ in 0..2 {
                let (ctl, id) = (harness.shared(), id.clone());
                tasks.push(tokio::spawn(async move {
                    advance_level(ctl.store(), ctl.clock(), ctl.config(), &id, 2).await
                }));
            }
            let mut wins = 0;
            let mut violations = 0;
            for task in tasks {
                match task.await.context("advance task panicked")? {
                    Ok(()) => wins += 1,
                    Err(HuntError::SequenceViolation { .. }) => violations += 1,
                    Err(err) => return Err(err).context("racing advancement failed"),
                }
            }
            ensure!(
                wins == 1 && violations == 1,
                "expected one win and one violation, got {wins} and {violations}"
            );
        }
        Ok(())
    }
}

pub struct UnregisteredDrill;

#[async_trait::async_trait]
impl Drill for UnregisteredDrill {
    fn name(&self) -> &'static str {
        "Unregistered Access"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let ctl = ctx.harness.controller();
        let id = participant(&ctx.tag("ghost"))?;

        ensure!(
            matches!(ctl.state(None).await, Err(HuntError::NotAuthenticated)),
            "missing identity should be refused"
        );
        ensure!(
            ctl.state(Some(&id)).await? == HuntState::Unregistered,
            "unknown identity should be unregistered"
        );
        ensure!(
            matches!(ctl.snapshot(Some(&id)).await, Err(HuntError::NoRecord)),
            "snapshot without a record should fail"
        );
        ensure!(
            matches!(
                ctl.submit_scan(Some(&id), "qr1").await,
                Err(HuntError::NoRecord)
            ),
            "scan without a record should fail"
        );

        ctl.register(Some(&id), "Ghost").await?;
        ensure!(
            matches!(
                ctl.register(Some(&id), "Ghost Again").await,
                Err(HuntError::AlreadyRegistered)
            ),
            "second registration should be refused"
        );
        let report = ctl.submit_scan(Some(&id), "qr1").await?;
        ensure!(
            report.outcome == ScanOutcome::NotStarted,
            "scans before begin should be ignored, got {:?}",
            report.outcome
        );
        Ok(())
    }
}

pub struct CompletionTimingDrill;

#[async_trait::async_trait]
impl Drill for CompletionTimingDrill {
    fn name(&self) -> &'static str {
        "Completion Timing"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let harness = ctx.harness;
        let ctl = harness.controller();
        let total = harness.total_levels();
        let id = harness.started_participant(&ctx.tag("timer")).await?;

        for level in 1..total {
            ctl.submit_scan(Some(&id), &code(level)).await?;
        }
        let snap = ctl.snapshot(Some(&id)).await?;
        ensure!(snap.elapsed_display == "--:--", "no time before completion");
        ensure!(snap.time_taken.is_none(), "no duration before completion");

        harness.clock().advance(Duration::seconds(125));
        let report = ctl.submit_scan(Some(&id), &code(total)).await?;
        ensure!(
            report.outcome == ScanOutcome::Completed,
            "final scan should complete, got {:?}",
            report.outcome
        );
        ensure!(
            report.snapshot.time_taken == Some(2.08),
            "125 seconds should be 2.08 minutes, got {:?}",
            report.snapshot.time_taken
        );
        ensure!(
            report.snapshot.elapsed_display == "02:05",
            "display should read 02:05, got {}",
            report.snapshot.elapsed_display
        );
        Ok(())
    }
}

pub struct ScanStreamDrill;

#[async_trait::async_trait]
impl Drill for ScanStreamDrill {
    fn name(&self) -> &'static str {
        "Scan Stream"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let harness = ctx.harness;
        let total = harness.total_levels();
        let id = harness.started_participant(&ctx.tag("camera")).await?;

        let (tx, rx) = mpsc::channel(64);
        let feeder = tokio::spawn(async move {
            for level in 1..=total {
                for frame in ["glare".to_string(), code(level), code(level), code(level)] {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
            }
        });

        let mut advanced = 0;
        let mut reports = 0;
        let snap = harness
            .controller()
            .run_scanner(&id, rx, |report| {
                reports += 1;
                if let Ok(report) = report
                    && matches!(
                        report.outcome,
                        ScanOutcome::Advanced { .. } | ScanOutcome::Completed
                    )
                {
                    advanced += 1;
                }
            })
            .await?;
        feeder.await.context("feeder panicked")?;

        ensure!(snap.completed, "stream should drive the hunt to completion");
        ensure!(advanced == total, "expected {total} advancements, saw {advanced}");
        if ctx.verbose {
            println!("   {reports} reports for {total} levels");
        }
        Ok(())
    }
}

pub struct StoreOutageDrill;

#[async_trait::async_trait]
impl Drill for StoreOutageDrill {
    fn name(&self) -> &'static str {
        "Store Outage"
    }

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
        let harness = ctx.harness;
        let ctl = harness.controller();
        let id = harness.started_participant(&ctx.tag("outage")).await?;

        harness.store().fail_next(1);
        match ctl.submit_scan(Some(&id), "qr1").await {
            Err(err) if err.is_retryable() => {}
            other => bail!("outage should surface as retryable, got {other:?}"),
        }
        let snap = ctl.snapshot(Some(&id)).await?;
        ensure!(snap.signals_found == 0, "failed scan must not set a flag");

        let report = ctl.submit_scan(Some(&id), "qr1").await?;
        ensure!(
            matches!(
                report.outcome,
                ScanOutcome::Advanced { cleared: 1 } | ScanOutcome::Completed
            ),
            "retry should succeed, got {:?}",
            report.outcome
        );
        Ok(())
    }
}
