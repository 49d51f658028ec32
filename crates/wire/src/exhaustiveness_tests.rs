//! The lint-time check design note §9 asks for: a test that pattern-matches
//! every tagged-enum variant through a function returning `()`, so adding a
//! new variant without updating its handler fails compilation here before
//! it ever reaches the dispatcher's own match in `anvil-daemon`.

use crate::monitor::{MonitorClientMessage, MonitorServerMessage};
use crate::query::Query;
use crate::response::Response;
use crate::status::StatusEvent;

fn handle_client_message(msg: &MonitorClientMessage) {
    match msg {
        MonitorClientMessage::Attach => {}
        MonitorClientMessage::Write { .. } => {}
        MonitorClientMessage::Detach => {}
        MonitorClientMessage::Ping => {}
    }
}

fn handle_server_message(msg: &MonitorServerMessage) {
    match msg {
        MonitorServerMessage::Attached { .. } => {}
        MonitorServerMessage::Data { .. } => {}
        MonitorServerMessage::Preempted => {}
        MonitorServerMessage::Reconnected => {}
        MonitorServerMessage::WriteAck => {}
        MonitorServerMessage::Error { .. } => {}
        MonitorServerMessage::Pong => {}
    }
}

fn handle_query(query: &Query) {
    match query {
        Query::ListDevices => {}
        Query::LocksStatus => {}
        Query::DaemonStatus => {}
        Query::DaemonVersion => {}
    }
}

fn handle_response(response: &Response) {
    match response {
        Response::Ok { .. } => {}
        Response::Error { .. } => {}
    }
}

fn handle_status_event(event: &StatusEvent) {
    match event {
        StatusEvent::PackageTask { .. } => {}
        StatusEvent::PackageSummary { .. } => {}
        StatusEvent::CompileUnit { .. } => {}
        StatusEvent::Log { .. } => {}
        StatusEvent::Terminal { .. } => {}
    }
}

#[test]
fn every_wire_variant_has_a_handler_arm() {
    handle_client_message(&MonitorClientMessage::Ping);
    handle_server_message(&MonitorServerMessage::Pong);
    handle_query(&Query::DaemonStatus);
    handle_response(&Response::Ok { value: serde_json::Value::Null });
    handle_status_event(&StatusEvent::Log { line: String::new() });
}
