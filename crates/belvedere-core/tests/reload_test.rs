// Belvedere Reload Integration Tests
//
// Exercises the reload coordinator and the daemon event handling against
// a mock HID bus and real configuration files in temporary directories.
//
// Run with: cargo test --test reload_test

mod reload_tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant, SystemTime};

    use belvedere_core::{
        send_command, ConfigError, ConfigLocator, ControlResponse, ControlServer, Daemon,
        DaemonEvent, DaemonOptions, MockHidBackend, RecordingExecutor, ReloadCoordinator,
        ReloadError, ReloadTrigger,
    };

    const TWO_DEVICES: &str = "\
[general]
setleds = /opt/leds
monitored_keycodes = 0x1234

[0x5043/0x54a3]
target = *
111 = +caps

[0x0483/0x5740]
1 = ^num
";

    fn write_with_mtime(path: &Path, contents: &str, secs: u64) {
        fs::write(path, contents).unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn handle_ids(coordinator: &ReloadCoordinator<MockHidBackend>) -> Vec<u64> {
        coordinator
            .devices()
            .iter()
            .map(|d| d.handle.handle_id())
            .collect()
    }

    fn attached_backend() -> MockHidBackend {
        let backend = MockHidBackend::new();
        backend.attach(0x5043, 0x54a3);
        backend.attach(0x0483, 0x5740);
        backend
    }

    // =========================================================================
    // Failed reloads keep the committed state
    // =========================================================================

    #[test]
    fn test_failed_reload_keeps_config_and_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        write_with_mtime(&path, TWO_DEVICES, 1_000);

        let backend = attached_backend();
        let mut coordinator =
            ReloadCoordinator::start(ConfigLocator::explicit(&path), backend.clone()).unwrap();
        let config_before = Arc::clone(coordinator.config());
        let handles_before = handle_ids(&coordinator);
        assert_eq!(handles_before.len(), 2);

        // Parses, but has no devices
        write_with_mtime(&path, "[general]\nmonitored_keycodes = 1\n", 2_000);
        let result = coordinator.reload(ReloadTrigger::Signal);
        assert!(matches!(
            result,
            Err(ReloadError::Config(ConfigError::Incomplete(_)))
        ));
        assert!(Arc::ptr_eq(&config_before, coordinator.config()));
        assert_eq!(handle_ids(&coordinator), handles_before);
        assert_eq!(backend.open_handle_count(), 2);

        // Gone entirely
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            coordinator.reload(ReloadTrigger::Control),
            Err(ReloadError::Config(ConfigError::NotFound { .. }))
        ));
        assert!(Arc::ptr_eq(&config_before, coordinator.config()));
        assert_eq!(handle_ids(&coordinator), handles_before);
    }

    #[test]
    fn test_successful_reload_replaces_devices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        write_with_mtime(&path, TWO_DEVICES, 1_000);

        let backend = attached_backend();
        let mut coordinator =
            ReloadCoordinator::start(ConfigLocator::explicit(&path), backend.clone()).unwrap();
        let handles_before = handle_ids(&coordinator);

        write_with_mtime(
            &path,
            "[general]\nmonitored_keycodes = 1\n[0483/5740]\n1 = -num\n",
            2_000,
        );
        let summary = coordinator.check_source().unwrap().unwrap();
        assert_eq!(summary.devices_configured, 1);
        assert_eq!(summary.devices_open, 1);
        assert_eq!(coordinator.devices().identities(), vec![(0x0483, 0x5740)]);
        assert!(handle_ids(&coordinator)
            .iter()
            .all(|id| !handles_before.contains(id)));
        assert_eq!(backend.open_handle_count(), 1);
    }

    // =========================================================================
    // Source resolution is re-evaluated on every check
    // =========================================================================

    #[test]
    fn test_higher_priority_source_is_picked_up() {
        let xdg = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();

        let home_config = home.path().join(".config/belvedere/config");
        fs::create_dir_all(home_config.parent().unwrap()).unwrap();
        write_with_mtime(&home_config, TWO_DEVICES, 1_000);

        let locator = ConfigLocator::with_roots(
            Some(xdg.path().to_path_buf()),
            Some(home.path().to_path_buf()),
            system.path().join("config"),
        );
        let mut coordinator = ReloadCoordinator::start(locator, attached_backend()).unwrap();
        assert_eq!(coordinator.source_path(), home_config.as_path());
        assert!(coordinator.check_source().is_none());

        let xdg_config = xdg.path().join("belvedere/config");
        fs::create_dir_all(xdg_config.parent().unwrap()).unwrap();
        // Older than the home file; the path change alone triggers the reload
        write_with_mtime(
            &xdg_config,
            "[general]\nmonitored_keycodes = 1\n[0483/5740]\n",
            10,
        );

        assert!(matches!(coordinator.check_source(), Some(Ok(_))));
        assert_eq!(coordinator.source_path(), xdg_config.as_path());
        assert_eq!(coordinator.config().devices.len(), 1);
    }

    // =========================================================================
    // Daemon events
    // =========================================================================

    #[test]
    fn test_signal_reload_is_unconditional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        write_with_mtime(&path, TWO_DEVICES, 1_000);

        let backend = attached_backend();
        let coordinator =
            ReloadCoordinator::start(ConfigLocator::explicit(&path), backend.clone()).unwrap();
        let mut daemon = Daemon::new(coordinator, RecordingExecutor::new(), DaemonOptions::default());

        let before = backend.enumerate_calls();
        assert!(daemon.handle_event(DaemonEvent::WatchConfig).is_continue());
        assert_eq!(backend.enumerate_calls(), before);

        assert!(daemon
            .handle_event(DaemonEvent::Reload(ReloadTrigger::Signal))
            .is_continue());
        assert_eq!(backend.enumerate_calls(), before + 2);
    }

    #[test]
    fn test_control_socket_drives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        write_with_mtime(&path, TWO_DEVICES, 1_000);

        let coordinator =
            ReloadCoordinator::start(ConfigLocator::explicit(&path), attached_backend()).unwrap();
        let socket = dir.path().join("ctl.sock");
        let server = ControlServer::bind(&socket).unwrap();
        let mut daemon = Daemon::new(coordinator, RecordingExecutor::new(), DaemonOptions::default())
            .with_control(server);

        let mut ask = |request: &'static str| -> ControlResponse {
            let socket = socket.clone();
            let client = thread::spawn(move || send_command(&socket, request));
            let deadline = Instant::now() + Duration::from_secs(5);
            while !client.is_finished() && Instant::now() < deadline {
                let _ = daemon.handle_event(DaemonEvent::Control);
                thread::sleep(Duration::from_millis(5));
            }
            client.join().unwrap().unwrap()
        };

        assert_eq!(
            ask("status"),
            ControlResponse::ok("Belvedere is running with 2 configured device(s), 2 open")
        );
        assert_eq!(ask("reload"), ControlResponse::ok("Configuration reloaded"));

        fs::write(&path, "garbage\n").unwrap();
        assert_eq!(
            ask("reload"),
            ControlResponse::error("Failed to reload configuration")
        );
        assert_eq!(ask(""), ControlResponse::error("No command provided"));
        assert_eq!(ask("stop"), ControlResponse::error("Unknown command: stop"));
        assert_eq!(
            ask("status"),
            ControlResponse::ok("Belvedere is running with 2 configured device(s), 2 open")
        );
    }
}
