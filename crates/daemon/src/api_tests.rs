use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracectl_core::{
    Bitness, ChannelAttr, EventAttr, EventKey, EventType, FdBudget, FixedClock, LogLevel, LogicalChannel,
    LogicalEvent, RegisterMsg, SequentialIdGen, SessionId,
};
use tracectl_reconcile::{Reconciler, ReconcileConfig};
use tracectl_registry::{App, AppRegistry, SocketId};
use tracectl_transport::{CalibrateParams, ConsumerEndpoints, FakeConsumerClient, FakeTracerTransport, TracerCall};

use super::*;

fn register_msg(pid: i32) -> RegisterMsg {
    RegisterMsg { name: "testapp".to_string(), pid, ppid: 1, uid: 1000, gid: 1000, bitness: 64, protocol_major: 2, protocol_minor: 0 }
}

fn tracepoint_event(name: &str, enabled: bool) -> LogicalEvent {
    LogicalEvent {
        key: EventKey::new(name, LogLevel::all(), None),
        attr: EventAttr { event_type: EventType::Tracepoint, loglevel: LogLevel::all() },
        enabled,
    }
}

fn test_controller() -> (Controller, Arc<FdBudget>) {
    let consumers = Arc::new(ConsumerEndpoints::new());
    consumers.set(Bitness::B64, Arc::new(FakeConsumerClient::new()));
    let fd_budget = Arc::new(FdBudget::new(1_000));
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 7, 26, 13, 5, 9).single().expect("valid fixed instant")));
    let reconciler = Reconciler::new(
        consumers.clone(),
        fd_budget.clone(),
        Arc::new(SequentialIdGen::new("uid")),
        clock,
        Arc::new(tracectl_reconcile::FakeTraceDirCreator::new()),
        ReconcileConfig::default(),
    );
    let registry = AppRegistry::new(consumers, fd_budget.clone(), 2);
    let controller = Controller::new(registry, reconciler, SessionStore::new());
    (controller, fd_budget)
}

fn register_app(controller: &Controller, pid: i32) -> (Arc<App>, Arc<FakeTracerTransport>) {
    let transport = Arc::new(FakeTracerTransport::new(pid));
    let msg = register_msg(pid);
    let app = controller.register(&msg, SocketId(pid), transport.clone()).expect("registration succeeds");
    app.set_compatible(true);
    (app, transport)
}

#[test]
fn register_and_unregister_round_trip() {
    let (controller, _fd_budget) = test_controller();
    let (app, _transport) = register_app(&controller, 100);
    assert_eq!(controller.registry().app_count(), 1);
    let removed = controller.unregister(app.sock);
    assert!(removed.is_some());
    assert_eq!(controller.registry().app_count(), 0);
}

#[test]
fn create_channel_then_event_materializes_on_registered_app() {
    let (controller, _fd_budget) = test_controller();
    let (_app, transport) = register_app(&controller, 101);

    let session_id = SessionId::new("sess-1");
    controller.ensure_session(&session_id, 1000, 1000);

    let channel = LogicalChannel::new("chan0", ChannelAttr::defaults_metadata());
    controller.create_channel_global(&session_id, channel).expect("create_channel_global succeeds");
    controller
        .create_event_global(&session_id, "chan0", tracepoint_event("ev0", true))
        .expect("create_event_global succeeds");

    let calls = transport.calls();
    assert!(matches!(calls[0], TracerCall::CreateSession));
    assert!(calls.iter().any(|c| matches!(c, TracerCall::CreateChannel { .. })));
    assert!(calls.iter().any(|c| matches!(c, TracerCall::CreateEvent { name, .. } if name == "ev0")));
}

#[test]
fn disable_then_enable_channel_global_toggles_every_app() {
    let (controller, _fd_budget) = test_controller();
    let (_app, transport) = register_app(&controller, 102);

    let session_id = SessionId::new("sess-2");
    controller.ensure_session(&session_id, 1000, 1000);
    controller
        .create_channel_global(&session_id, LogicalChannel::new("chan0", ChannelAttr::defaults_metadata()))
        .expect("create_channel_global succeeds");

    controller.disable_channel_global(&session_id, "chan0").expect("disable succeeds");
    assert!(transport.calls().iter().any(|c| matches!(c, TracerCall::Disable(_))));

    controller.enable_channel_global(&session_id, "chan0").expect("enable succeeds");
    assert!(transport.calls().iter().any(|c| matches!(c, TracerCall::Enable(_))));
}

#[test]
fn global_update_replays_logical_config_onto_newly_registered_app() {
    let (controller, _fd_budget) = test_controller();

    let session_id = SessionId::new("sess-3");
    controller.ensure_session(&session_id, 1000, 1000);
    controller
        .create_channel_global(&session_id, LogicalChannel::new("chan0", ChannelAttr::defaults_metadata()))
        .expect("create_channel_global with no apps registered still updates the store");
    controller
        .create_event_global(&session_id, "chan0", tracepoint_event("ev0", true))
        .expect("create_event_global with no apps registered still updates the store");

    let (app, transport) = register_app(&controller, 103);
    controller.global_update(app.sock).expect("global_update succeeds");

    let calls = transport.calls();
    assert!(calls.iter().any(|c| matches!(c, TracerCall::CreateChannel { .. })));
    assert!(calls.iter().any(|c| matches!(c, TracerCall::CreateEvent { name, .. } if name == "ev0")));
}

#[test]
fn start_stop_destroy_trace_all_runs_the_full_lifecycle() {
    let (controller, _fd_budget) = test_controller();
    let (_app, transport) = register_app(&controller, 104);

    let session_id = SessionId::new("sess-4");
    controller.ensure_session(&session_id, 1000, 1000);
    controller
        .create_channel_global(&session_id, LogicalChannel::new("chan0", ChannelAttr::defaults_metadata()))
        .expect("create_channel_global succeeds");

    controller.start_trace_all(&session_id).expect("start_trace_all succeeds");
    assert!(transport.calls().iter().any(|c| matches!(c, TracerCall::StartSession(_))));

    controller.stop_trace_all(&session_id).expect("stop_trace_all succeeds");
    assert!(transport.calls().iter().any(|c| matches!(c, TracerCall::StopSession(_))));

    controller.destroy_trace_all(&session_id).expect("destroy_trace_all succeeds");
}

#[test]
fn list_tracepoints_concatenates_across_compatible_apps() {
    let (controller, _fd_budget) = test_controller();
    register_app(&controller, 105);
    register_app(&controller, 106);

    let points = controller.list_tracepoints();
    assert_eq!(points.len(), 2);
    assert!(points.iter().all(|p| p.name == "sched_switch"));
}

#[test]
fn calibrate_reaches_every_compatible_app() {
    let (controller, _fd_budget) = test_controller();
    let (_app, _transport) = register_app(&controller, 107);
    controller.calibrate(&CalibrateParams::default()).expect("calibrate succeeds");
}
