//! Modules shipped with the daemon.

use rpcd_types::{ErrorCode, RpcError, Value, ValueKind};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::firewall::FirewallRule;
use crate::module::{ModuleInfo, RpcModule};
use crate::request::Request;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Replies with `{"msg": …}` when a message is given, otherwise with the
/// parameters unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoModule;

impl RpcModule for EchoModule {
    fn handle(&self, _info: &ModuleInfo, request: &mut Request) -> bool {
        let reply = match request.params().get("msg") {
            Some(message) => [("msg", message.clone())].into_iter().collect(),
            None => request.params().clone(),
        };
        request.set_reply(reply);
        true
    }

    fn firewall(&self) -> Vec<FirewallRule> {
        vec![FirewallRule::new("msg").with_kind(ValueKind::String)]
    }
}

/// Replies with the current UTC time as `{"date": "YYYY-MM-DD HH:MM:SS"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateModule;

impl RpcModule for DateModule {
    fn handle(&self, _info: &ModuleInfo, request: &mut Request) -> bool {
        match OffsetDateTime::now_utc().format(DATE_FORMAT) {
            Ok(date) => {
                request.set_reply([("date", date)].into_iter().collect::<Value>());
                true
            }
            Err(error) => {
                request.set_error(
                    RpcError::from_code(ErrorCode::InternalError).with_data(error.to_string()),
                );
                false
            }
        }
    }
}

/// Replies with `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingModule;

impl RpcModule for PingModule {
    fn handle(&self, _info: &ModuleInfo, request: &mut Request) -> bool {
        request.set_reply(true);
        true
    }
}
