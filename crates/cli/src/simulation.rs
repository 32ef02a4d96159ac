use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use frametask_scheduler::{
    DgmlGraph, OnTaskRunning, ParallelForParams, Priority, Scheduler, Task, TaskGroupId,
    TaskNesting,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::ScenarioConfig;

/// Outcome of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub frames: u32,
    pub total_ms: f64,
    pub avg_frame_ms: f64,
    pub max_frame_ms: f64,
    pub physics_runs: u64,
    pub animation_invocations: u64,
    pub render_items: u64,
    pub main_thread_runs: u64,
    pub next_frame_runs: u64,
    pub streaming_chunks: u64,
}

#[derive(Default)]
struct Counters {
    physics: AtomicU64,
    animation: AtomicU64,
    render: AtomicU64,
    main_thread: AtomicU64,
    next_frame: AtomicU64,
    streaming: AtomicU64,
}

/// Busy-wait, standing in for real per-task computation.
fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Run every frame of `scenario` on `scheduler`.
pub fn run(scheduler: &Scheduler, scenario: &ScenarioConfig, snapshot: Option<&Path>) -> Result<RunReport> {
    let counters = Arc::new(Counters::default());
    let work = Duration::from_micros(scenario.work_us);
    let started_at = Utc::now();

    let streaming = if scenario.streaming {
        Some(start_streaming(scheduler, &counters, work)?)
    } else {
        None
    };

    let mut frame_times = Vec::with_capacity(scenario.frames as usize);
    let started = Instant::now();
    for frame in 0..scenario.frames {
        let frame_start = Instant::now();
        let groups = build_frame(scheduler, scenario, &counters, work)?;
        if frame == 0 {
            if let Some(path) = snapshot {
                write_snapshot(scheduler, path)?;
            }
        }
        // later stages first: dispatch must still follow the dependencies
        for group in groups.iter().rev() {
            scheduler.start_task_group(*group)?;
        }
        scheduler
            .finish_frame_tasks()
            .with_context(|| format!("frame {frame} failed"))?;

        let elapsed = frame_start.elapsed();
        debug!("Frame {} finished in {:?}", frame, elapsed);
        frame_times.push(elapsed);
    }
    let total = started.elapsed();

    // the last frame's next-frame work
    scheduler.finish_frame_tasks()?;

    if let Some((task, group)) = streaming {
        let outcome = scheduler.cancel_task(&task, OnTaskRunning::WaitTillFinished);
        debug!(?outcome, "Streaming task stopped");
        scheduler.wait_for_group(group);
    }

    let frames = frame_times.len().max(1) as f64;
    let report = RunReport {
        started_at,
        frames: scenario.frames,
        total_ms: millis(total),
        avg_frame_ms: millis(total) / frames,
        max_frame_ms: frame_times.iter().copied().map(millis).fold(0.0, f64::max),
        physics_runs: counters.physics.load(Ordering::Relaxed),
        animation_invocations: counters.animation.load(Ordering::Relaxed),
        render_items: counters.render.load(Ordering::Relaxed),
        main_thread_runs: counters.main_thread.load(Ordering::Relaxed),
        next_frame_runs: counters.next_frame.load(Ordering::Relaxed),
        streaming_chunks: counters.streaming.load(Ordering::Relaxed),
    };
    info!(
        "Simulated {} frames in {:.1}ms (avg {:.2}ms, max {:.2}ms)",
        report.frames, report.total_ms, report.avg_frame_ms, report.max_frame_ms
    );
    Ok(report)
}

/// Cooperative background task that runs until canceled.
fn start_streaming(
    scheduler: &Scheduler,
    counters: &Arc<Counters>,
    work: Duration,
) -> Result<(Arc<Task>, TaskGroupId)> {
    let counters = Arc::clone(counters);
    let task = Task::from_fn("streaming", move |ctx| {
        while !ctx.has_been_canceled() {
            spin_for(work);
            counters.streaming.fetch_add(1, Ordering::Relaxed);
            thread::sleep(Duration::from_millis(1));
        }
    });
    let group = scheduler.start_single_task(&task, Priority::LongRunning, None)?;
    Ok((task, group))
}

/// Create (but do not start) one frame's groups:
/// physics -> animation -> render -> ui, plus independent next-frame audio.
fn build_frame(
    scheduler: &Scheduler,
    scenario: &ScenarioConfig,
    counters: &Arc<Counters>,
    work: Duration,
) -> Result<Vec<TaskGroupId>> {
    let physics = scheduler.create_task_group(Priority::EarlyThisFrame, None);
    for i in 0..scenario.tasks_per_frame {
        let counters = Arc::clone(counters);
        let task = Task::from_fn(format!("physics-{i}"), move |_| {
            spin_for(work);
            counters.physics.fetch_add(1, Ordering::Relaxed);
        });
        scheduler.add_task_to_group(physics, &task)?;
    }

    let animation = scheduler.create_task_group(Priority::ThisFrame, None);
    let animate = {
        let counters = Arc::clone(counters);
        Task::from_fn("animation", move |_| {
            spin_for(work / 4);
            counters.animation.fetch_add(1, Ordering::Relaxed);
        })
    };
    animate.set_multiplicity(scenario.multiplicity)?;
    scheduler.add_task_to_group(animation, &animate)?;
    scheduler.add_task_group_dependency(animation, physics)?;

    let render = scheduler.create_task_group(Priority::LateThisFrame, None);
    let render_items = scenario.render_items;
    let prep = {
        let counters = Arc::clone(counters);
        Task::from_fn("render-prep", move |ctx| {
            let counters = Arc::clone(&counters);
            let result = ctx.scheduler().parallel_for_indexed(
                0..render_items,
                ParallelForParams::default(),
                "render-slice",
                move |range| {
                    spin_for(work / 8);
                    counters
                        .render
                        .fetch_add(u64::from(range.end - range.start), Ordering::Relaxed);
                },
            );
            if let Err(e) = result {
                error!("Render preparation failed: {}", e);
            }
        })
    };
    prep.configure("render-prep", TaskNesting::Maybe, None)?;
    scheduler.add_task_to_group(render, &prep)?;
    scheduler.add_task_group_dependency(render, animation)?;

    let ui = scheduler.create_task_group(Priority::ThisFrameMainThread, None);
    for i in 0..scenario.main_thread_tasks {
        let counters = Arc::clone(counters);
        let task = Task::from_fn(format!("ui-{i}"), move |_| {
            counters.main_thread.fetch_add(1, Ordering::Relaxed);
        });
        scheduler.add_task_to_group(ui, &task)?;
    }
    scheduler.add_task_group_dependency(ui, render)?;

    let audio = scheduler.create_task_group(Priority::NextFrame, None);
    let mix = {
        let counters = Arc::clone(counters);
        Task::from_fn("audio-mix", move |_| {
            spin_for(work);
            counters.next_frame.fetch_add(1, Ordering::Relaxed);
        })
    };
    scheduler.add_task_to_group(audio, &mix)?;

    Ok(vec![physics, animation, render, ui, audio])
}

fn write_snapshot(scheduler: &Scheduler, path: &Path) -> Result<()> {
    let mut graph = DgmlGraph::new();
    scheduler.write_state_snapshot_to_dgml(&mut graph);
    let file = File::create(path)
        .with_context(|| format!("failed to create snapshot: {}", path.display()))?;
    graph
        .write_to(BufWriter::new(file))
        .with_context(|| format!("failed to write snapshot: {}", path.display()))?;
    info!("Wrote task graph snapshot to {}", path.display());
    Ok(())
}
