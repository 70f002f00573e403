use std::time::Duration;

use backdrop::backend::{physical_size, GeometryId};
use backdrop::engine::EngineError;
use backdrop::{
    mount, BackdropHandle, ContainerRect, EnvironmentSignals, EventKind, GpuResource,
    HeadlessBackend, HeadlessHost, Host, HostEvent, MountError, MountOptions, SunParams, ThemeKind,
};
use scheduler::ManualClock;

fn host() -> HeadlessHost {
    HeadlessHost::new(ContainerRect::sized(1280, 720))
}

fn options(clock: &ManualClock) -> MountOptions {
    MountOptions::default().with_clock(Box::new(clock.clone()))
}

fn mount_theme(
    host: &mut HeadlessHost,
    backend: &mut HeadlessBackend,
    kind: ThemeKind,
    signals: &EnvironmentSignals,
    clock: &ManualClock,
) -> BackdropHandle {
    let container = host.root_container().expect("root container");
    mount(host, backend, Some(container), kind, signals, options(clock)).expect("mount")
}

/// Delivers the next pending frame request after advancing the clock.
fn step(
    host: &mut HeadlessHost,
    backend: &mut HeadlessBackend,
    handle: &mut BackdropHandle,
    clock: &ManualClock,
) -> bool {
    clock.advance(Duration::from_millis(16));
    let (id, _) = host.next_frame().expect("a frame is pending");
    handle.frame(host, backend, id)
}

#[test]
fn starfield_mount_renders_first_frame_and_schedules_the_loop() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let handle = mount(
        &mut host,
        &mut backend,
        None,
        ThemeKind::Starfield,
        &EnvironmentSignals::new(),
        options(&clock),
    )
    .unwrap();

    assert!(handle.is_active());
    let engine = handle.engine().unwrap();
    assert_eq!(engine.particle_count(), 2000);
    assert_eq!(backend.frames_rendered(), 1);
    assert_eq!(backend.last_frame().unwrap().time, 0.0);
    assert_eq!(host.pending_count(), 1);
    assert_eq!(host.attached_count(engine.container()), 1);
    assert_eq!(engine.live_resources(), backend.live_resources());

    let mut handle = handle;
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn teardown_releases_everything_and_is_idempotent() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let root = host.root_container().unwrap();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    assert!(step(&mut host, &mut backend, &mut handle, &clock));

    let first = handle.teardown(&mut host, &mut backend);
    assert!(first.disposed > 0);
    assert!(first.detached);
    assert_eq!(first.failures, 0);
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(host.attached_count(root), 0);
    assert_eq!(host.subscription_count(), 0);
    assert_eq!(host.pending_count(), 0);
    assert!(!handle.is_active());

    let second = handle.teardown(&mut host, &mut backend);
    assert_eq!(second, Default::default());
    assert_eq!(backend.double_disposals(), 0);
}

#[test]
fn frames_after_teardown_are_ignored() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    let (id, _) = host.next_frame().unwrap();
    handle.teardown(&mut host, &mut backend);

    assert!(!handle.frame(&mut host, &mut backend, id));
    assert_eq!(backend.frames_rendered(), 1);
    assert!(handle
        .set_sun_params(&mut backend, SunParams::default())
        .is_ok());
}

#[test]
fn themes_without_root_fallback_stay_inert() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let root = host.root_container().unwrap();
    host.insert_stale_surface(root, "backdrop-ink");
    host.insert_stale_surface(root, "backdrop-ocean");
    for kind in [ThemeKind::Ink, ThemeKind::Ocean] {
        let mut handle = mount(&mut host, &mut backend, None, kind, &EnvironmentSignals::new(), options(&clock)).unwrap();
        assert!(!handle.is_active());
        assert!(handle.engine().is_none());
        assert!(handle.subscriptions(EventKind::Resize).is_empty());
        assert_eq!(handle.teardown(&mut host, &mut backend), Default::default());
    }
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(host.pending_count(), 0);
    assert_eq!(host.subscription_count(), 0);
    assert_eq!(host.surface_calls(), 0);
    assert_eq!(host.attached_count(root), 2);
}

#[test]
fn missing_host_container_makes_starfield_inert() {
    let clock = ManualClock::new();
    let mut host = HeadlessHost::without_root();
    let mut backend = HeadlessBackend::new();
    let handle = mount(
        &mut host,
        &mut backend,
        None,
        ThemeKind::Starfield,
        &EnvironmentSignals::new(),
        options(&clock),
    )
    .unwrap();
    assert!(!handle.is_active());
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(backend.frames_rendered(), 0);
    assert_eq!(host.pending_count(), 0);
    assert_eq!(host.subscription_count(), 0);
    assert_eq!(host.surface_calls(), 0);
}

#[test]
fn same_seed_builds_identical_scenes() {
    let build = |seed: u32| {
        let clock = ManualClock::new();
        let mut host = host();
        let mut backend = HeadlessBackend::new();
        let options = MountOptions {
            seed,
            ..MountOptions::default()
        }
        .with_clock(Box::new(clock));
        let root = host.root_container().unwrap();
        let mut handle = mount(&mut host, &mut backend, Some(root), ThemeKind::Starfield, &EnvironmentSignals::new(), options)
            .unwrap();
        let geometry: Vec<Vec<[f32; 3]>> = (1..64)
            .filter_map(|id| backend.geometry(GeometryId(id)))
            .map(|record| record.positions.clone())
            .collect();
        handle.teardown(&mut host, &mut backend);
        geometry
    };

    let first = build(7);
    assert!(!first.is_empty());
    assert_eq!(first, build(7));
    assert_ne!(first, build(8));
}

#[test]
fn reduced_motion_throttles_the_loop_and_shrinks_the_field() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let signals = EnvironmentSignals::new().with_reduced_motion(true);
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &signals, &clock);

    let engine = handle.engine().unwrap();
    assert_eq!(engine.particle_count(), 700);
    assert!(!engine.quality().enable_trail);
    assert!(handle.subscriptions(EventKind::PointerMove).is_empty());

    assert!(step(&mut host, &mut backend, &mut handle, &clock));
    let (_, delay) = *host.pending_frames().next().unwrap();
    assert_eq!(delay, Some(Duration::from_millis(1000)));
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn custom_throttle_interval_is_honoured() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let root = host.root_container().unwrap();
    let options = MountOptions {
        throttle_interval: Duration::from_millis(250),
        ..MountOptions::default()
    }
    .with_clock(Box::new(clock.clone()));
    let signals = EnvironmentSignals::new().with_reduced_motion(true);
    let mut handle = mount(&mut host, &mut backend, Some(root), ThemeKind::Starfield, &signals, options).unwrap();

    assert!(step(&mut host, &mut backend, &mut handle, &clock));
    assert_eq!(host.next_frame().unwrap().1, Some(Duration::from_millis(250)));
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn resize_updates_aspect_and_surface_on_next_frame() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    let surface = handle.engine().unwrap().surface();
    assert_eq!(backend.surface_size(surface), Some((1280, 720)));

    let subscription = handle.subscriptions(EventKind::Resize)[0];
    handle.handle_event(subscription, &HostEvent::Resize(ContainerRect::sized(800, 400)));
    assert_eq!(handle.engine().unwrap().camera().aspect(), 2.0);

    assert!(step(&mut host, &mut backend, &mut handle, &clock));
    assert_eq!(backend.surface_size(surface), Some(physical_size(800, 400, 1.0)));
    assert_eq!(backend.last_frame().unwrap().camera.aspect, 2.0);
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn events_on_foreign_subscriptions_are_ignored() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    let pointer = handle.subscriptions(EventKind::PointerMove)[0];

    // A resize delivered on the pointer subscription does not apply.
    handle.handle_event(pointer, &HostEvent::Resize(ContainerRect::sized(100, 400)));
    assert_ne!(handle.engine().unwrap().camera().aspect(), 0.25);
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn pointer_parallax_eases_the_camera_toward_the_cursor() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    let pointer = handle.subscriptions(EventKind::PointerMove)[0];
    handle.handle_event(pointer, &HostEvent::PointerMove { x: 1280.0, y: 0.0 });

    let mut previous = handle.engine().unwrap().camera().position.x;
    assert_eq!(previous, 0.0);
    for _ in 0..30 {
        assert!(step(&mut host, &mut backend, &mut handle, &clock));
        let x = handle.engine().unwrap().camera().position.x;
        assert!(x > previous);
        assert!(x < 1.0);
        previous = x;
    }
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn ink_mounts_into_an_explicit_container() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Ink, &EnvironmentSignals::new(), &clock);

    assert!(handle.is_active());
    assert_eq!(handle.engine().unwrap().particle_count(), 18_000);
    let frame = backend.last_frame().unwrap();
    assert!(frame.fog.is_some());
    assert!(!frame.draws.is_empty());

    assert!(step(&mut host, &mut backend, &mut handle, &clock));
    handle.teardown(&mut host, &mut backend);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn hidden_ocean_skips_rendering_but_keeps_a_request_pending() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Ocean, &EnvironmentSignals::new(), &clock);
    let visibility = handle.subscriptions(EventKind::VisibilityChange)[0];

    handle.handle_event(visibility, &HostEvent::VisibilityChange { visible: false });
    for _ in 0..3 {
        assert!(!step(&mut host, &mut backend, &mut handle, &clock));
        assert_eq!(host.pending_count(), 1);
    }
    assert_eq!(backend.frames_rendered(), 1);

    handle.handle_event(visibility, &HostEvent::VisibilityChange { visible: true });
    assert!(step(&mut host, &mut backend, &mut handle, &clock));
    assert_eq!(backend.frames_rendered(), 2);
    let frame = backend.last_frame().unwrap();
    assert_eq!(frame.exposure, Some(0.5));
    assert!(frame.sun_direction.is_some());
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn moving_the_sun_replaces_exactly_the_old_environment() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Ocean, &EnvironmentSignals::new(), &clock);
    let old = handle.engine().unwrap().environment_texture().unwrap();
    let textures = backend.live_textures();

    let sun = SunParams {
        elevation: 30.0,
        azimuth: 90.0,
    };
    handle.set_sun_params(&mut backend, sun).unwrap();
    let engine = handle.engine().unwrap();
    let new = engine.environment_texture().unwrap();
    assert_ne!(old, new);
    assert_eq!(engine.sun_params(), Some(sun));
    assert!(backend.was_disposed(GpuResource::Texture(old)));
    assert!(backend.texture(new).is_some());
    assert_eq!(backend.live_textures(), textures);

    handle.teardown(&mut host, &mut backend);
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(backend.double_disposals(), 0);
}

/// Every texture sampled by the last rendered frame is still alive.
fn drawn_textures_are_live(backend: &HeadlessBackend) -> bool {
    let frame = backend.last_frame().expect("a rendered frame");
    frame.draws.iter().all(|draw| {
        backend
            .material(draw.material)
            .is_some_and(|desc| desc.textures().into_iter().all(|texture| backend.texture(texture).is_some()))
    })
}

#[test]
fn failed_sun_move_keeps_the_old_environment_bound() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Ocean, &EnvironmentSignals::new(), &clock);
    let old = handle.engine().unwrap().environment_texture().unwrap();
    let before = handle.engine().unwrap().sun_params();
    let textures = backend.live_textures();

    // Water rebinds, the cube does not; the rollback itself succeeds.
    backend.fail_material_update(1);
    let sun = SunParams {
        elevation: 10.0,
        azimuth: 45.0,
    };
    assert!(handle.set_sun_params(&mut backend, sun).is_err());
    assert_eq!(handle.engine().unwrap().environment_texture(), Some(old));
    assert_eq!(handle.engine().unwrap().sun_params(), before);
    assert_eq!(backend.live_textures(), textures);

    assert!(step(&mut host, &mut backend, &mut handle, &clock));
    assert!(drawn_textures_are_live(&backend));

    handle.teardown(&mut host, &mut backend);
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(backend.double_disposals(), 0);
}

#[test]
fn failed_rollback_still_releases_the_new_environment_once() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Ocean, &EnvironmentSignals::new(), &clock);
    let old = handle.engine().unwrap().environment_texture().unwrap();
    let textures = backend.live_textures();

    // The cube rebind fails and so does restoring the water.
    backend.fail_material_update(1);
    backend.fail_material_update(2);
    assert!(handle.set_sun_params(&mut backend, SunParams::default()).is_err());

    assert_eq!(handle.engine().unwrap().environment_texture(), Some(old));
    assert_eq!(backend.live_textures(), textures);

    handle.teardown(&mut host, &mut backend);
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(backend.double_disposals(), 0);
}

#[test]
fn sun_controls_are_ocean_only() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    let error = handle
        .set_sun_params(&mut backend, SunParams::default())
        .unwrap_err();
    assert!(matches!(
        error,
        EngineError::Unsupported {
            theme: ThemeKind::Starfield,
            ..
        }
    ));
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn stale_surfaces_with_the_theme_tag_are_replaced() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    let root = host.root_container().unwrap();
    host.insert_stale_surface(root, "backdrop-starfield");
    host.insert_stale_surface(root, "backdrop-starfield");
    host.insert_stale_surface(root, "someone-else");

    let mut handle = mount_theme(&mut host, &mut backend, ThemeKind::Starfield, &EnvironmentSignals::new(), &clock);
    assert_eq!(host.tagged_count(root, "backdrop-starfield"), 1);
    assert_eq!(host.tagged_count(root, "someone-else"), 1);
    handle.teardown(&mut host, &mut backend);
}

#[test]
fn failed_mount_releases_partial_allocations() {
    for successes in [0, 1, 3, 5, 7] {
        let clock = ManualClock::new();
        let mut host = host();
        let mut backend = HeadlessBackend::new().fail_creations_after(successes);
        let root = host.root_container().unwrap();
        let result = mount(
            &mut host,
            &mut backend,
            Some(root),
            ThemeKind::Starfield,
            &EnvironmentSignals::new(),
            options(&clock),
        );

        assert!(result.is_err(), "mount succeeded with {successes} allocations");
        assert!(matches!(
            result,
            Err(MountError::Backend(_)) | Err(MountError::Texture(_))
        ));
        assert_eq!(backend.live_resources(), 0);
        assert_eq!(host.attached_count(root), 0);
        assert_eq!(host.subscription_count(), 0);
        assert_eq!(host.pending_count(), 0);
        assert_eq!(backend.double_disposals(), 0);
    }
}

#[test]
fn repeated_mount_cycles_leave_nothing_behind() {
    let clock = ManualClock::new();
    let mut host = host();
    let mut backend = HeadlessBackend::new();
    for kind in ThemeKind::ALL.iter().copied().cycle().take(6) {
        let mut handle = mount_theme(&mut host, &mut backend, kind, &EnvironmentSignals::new(), &clock);
        for _ in 0..3 {
            step(&mut host, &mut backend, &mut handle, &clock);
        }
        handle.teardown(&mut host, &mut backend);
        assert_eq!(backend.live_resources(), 0, "{kind} leaked");
        assert_eq!(host.pending_count(), 0);
        assert_eq!(host.subscription_count(), 0);
    }
    assert_eq!(backend.double_disposals(), 0);
}
