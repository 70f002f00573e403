//! Drives a mount on the headless host and backend with a manual clock.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use backdrop::{
    mount, ContainerRect, EnvironmentSignals, HeadlessBackend, HeadlessHost, Host, MountOptions,
    ThemeKind,
};
use scheduler::ManualClock;
use serde::Serialize;

pub struct HeadlessRun {
    pub theme: ThemeKind,
    pub size: (u32, u32),
    pub signals: EnvironmentSignals,
    pub options: MountOptions,
    pub frames: u32,
    /// Clock advance per unthrottled frame.
    pub frame_step: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeadlessReport {
    pub theme: ThemeKind,
    pub active: bool,
    pub seed: u32,
    pub mobile: bool,
    pub reduced_motion: bool,
    pub particles: usize,
    pub point_texture_size: u32,
    pub trail: bool,
    /// Reschedule delay in milliseconds when the loop is throttled.
    pub throttle_ms: Option<u64>,
    pub frames_requested: u32,
    pub frames_rendered: usize,
    pub simulated_ms: u64,
    pub peak_resources: usize,
    pub disposed: usize,
    pub disposal_failures: usize,
    pub live_resources: usize,
    pub double_disposals: usize,
    pub pending_frames: usize,
    pub subscriptions: usize,
}

impl HeadlessReport {
    /// Fails when teardown left anything behind.
    pub fn check(&self) -> Result<()> {
        if self.live_resources != 0 || self.pending_frames != 0 || self.subscriptions != 0 {
            bail!(
                "teardown leaked: {} resources, {} pending frames, {} subscriptions",
                self.live_resources,
                self.pending_frames,
                self.subscriptions
            );
        }
        if self.double_disposals != 0 {
            bail!("{} resources were disposed twice", self.double_disposals);
        }
        Ok(())
    }
}

pub fn run(run: HeadlessRun) -> Result<HeadlessReport> {
    let clock = ManualClock::new();
    let seed = run.options.seed;
    let mut host = HeadlessHost::new(ContainerRect::sized(run.size.0, run.size.1));
    let mut backend = HeadlessBackend::new();
    let root = host.root_container();
    let mut handle = mount(
        &mut host,
        &mut backend,
        root,
        run.theme,
        &run.signals,
        run.options.with_clock(Box::new(clock.clone())),
    )
    .with_context(|| format!("failed to mount {} backdrop", run.theme))?;

    let mut report = HeadlessReport {
        theme: run.theme,
        active: handle.is_active(),
        seed,
        mobile: false,
        reduced_motion: false,
        particles: 0,
        point_texture_size: 0,
        trail: false,
        throttle_ms: None,
        frames_requested: 0,
        frames_rendered: 0,
        simulated_ms: 0,
        peak_resources: backend.live_resources(),
        disposed: 0,
        disposal_failures: 0,
        live_resources: 0,
        double_disposals: 0,
        pending_frames: 0,
        subscriptions: 0,
    };
    if let Some(engine) = handle.engine() {
        let quality = engine.quality();
        report.mobile = engine.profile().is_mobile;
        report.reduced_motion = engine.profile().reduced_motion;
        report.particles = engine.particle_count();
        report.point_texture_size = quality.point_texture_size;
        report.trail = quality.enable_trail;
        report.throttle_ms = quality
            .frame_cadence
            .reschedule_delay()
            .map(|delay| delay.as_millis() as u64);
    }

    let mut simulated = Duration::ZERO;
    for _ in 0..run.frames {
        let Some((id, delay)) = host.next_frame() else {
            break;
        };
        let step = delay.unwrap_or(run.frame_step);
        clock.advance(step);
        simulated += step;
        report.frames_requested += 1;
        handle.frame(&mut host, &mut backend, id);
        report.peak_resources = report.peak_resources.max(backend.live_resources());
    }

    let teardown = handle.teardown(&mut host, &mut backend);
    report.frames_rendered = backend.frames_rendered();
    report.simulated_ms = simulated.as_millis() as u64;
    report.disposed = teardown.disposed;
    report.disposal_failures = teardown.failures;
    report.live_resources = backend.live_resources();
    report.double_disposals = backend.double_disposals();
    report.pending_frames = host.pending_count();
    report.subscriptions = host.subscription_count();

    tracing::info!(
        theme = %report.theme,
        frames = report.frames_rendered,
        disposed = report.disposed,
        live = report.live_resources,
        "headless run complete"
    );
    Ok(report)
}

pub fn print_report(report: &HeadlessReport, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, report).context("failed to encode report")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "theme:            {}", report.theme)?;
    writeln!(out, "active:           {}", report.active)?;
    writeln!(out, "seed:             {}", report.seed)?;
    writeln!(
        out,
        "device:           mobile={} reduced_motion={}",
        report.mobile, report.reduced_motion
    )?;
    writeln!(
        out,
        "quality:          particles={} point_texture={} trail={}",
        report.particles, report.point_texture_size, report.trail
    )?;
    match report.throttle_ms {
        Some(ms) => writeln!(out, "cadence:          throttled every {ms} ms")?,
        None => writeln!(out, "cadence:          every frame")?,
    }
    writeln!(
        out,
        "frames:           {} rendered of {} requested over {} ms",
        report.frames_rendered, report.frames_requested, report.simulated_ms
    )?;
    writeln!(
        out,
        "resources:        peak={} disposed={} failures={} live={}",
        report.peak_resources, report.disposed, report.disposal_failures, report.live_resources
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless(theme: ThemeKind, signals: EnvironmentSignals, frames: u32) -> HeadlessReport {
        run(HeadlessRun {
            theme,
            size: (1024, 768),
            signals,
            options: MountOptions::default(),
            frames,
            frame_step: Duration::from_millis(16),
        })
        .unwrap()
    }

    #[test]
    fn every_theme_runs_and_cleans_up() {
        for theme in ThemeKind::ALL {
            let report = headless(theme, EnvironmentSignals::new(), 10);
            assert!(report.active);
            // The mount renders one frame before the loop starts.
            assert_eq!(report.frames_rendered, 11, "{theme}");
            assert!(report.peak_resources > 0);
            assert_eq!(report.disposed, report.peak_resources);
            report.check().unwrap();
        }
    }

    #[test]
    fn reduced_motion_advances_by_the_throttle_interval() {
        let report = headless(
            ThemeKind::Starfield,
            EnvironmentSignals::new().with_reduced_motion(true),
            4,
        );
        assert_eq!(report.throttle_ms, Some(1000));
        assert_eq!(report.particles, 700);
        // The first loop frame is requested without delay.
        assert_eq!(report.simulated_ms, 16 + 3 * 1000);
    }

    #[test]
    fn report_serializes_theme_in_lowercase() {
        let report = headless(ThemeKind::Ocean, EnvironmentSignals::new(), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["theme"], "ocean");
        assert_eq!(json["particles"], 0);
    }
}
