//! Command handler implementations (§4.7). Each returns a `payload` value
//! for a `type=response` envelope with `status=success`, or an [`ErrorShape`]
//! that the registry turns into `status=error`.

use arqonbus_history::HistoryKey;
use arqonbus_protocol::{ErrorShape, Role, error_codes};
use arqonbus_rooms::store::ChannelInfo;

use crate::args::{
    self, ChannelInfoArgs, CreateChannelArgs, DeleteChannelArgs, HistoryGetArgs, HistoryReplayArgs,
    JoinChannelArgs, LeaveChannelArgs, ListChannelsArgs,
};
use crate::context::CommandContext;
use crate::registry::CommandResult;

fn validation_error(command: &str, reason: impl std::fmt::Display) -> ErrorShape {
    ErrorShape::new(error_codes::COMMAND_VALIDATION_ERROR, format!("{command}: {reason}"))
}

fn channel_info_json(info: &ChannelInfo) -> serde_json::Value {
    serde_json::json!({
        "room": info.room,
        "channel": info.channel,
        "creator": info.creator,
        "created_at": info.created_at,
        "description": info.description,
        "members": info.members,
    })
}

pub async fn ping(_ctx: &CommandContext) -> CommandResult {
    Ok(serde_json::json!({ "pong": true, "server_time_ms": arqonbus_common::time::now_ms() }))
}

pub async fn status(ctx: &CommandContext) -> CommandResult {
    Ok(serde_json::json!({
        "tenant_id": ctx.tenant_id(),
        "client_id": ctx.client_id(),
        "session_count": ctx.registry.session_count(),
        "history_durable_degraded": ctx.history.is_durable_degraded(),
    }))
}

pub async fn help(ctx: &CommandContext) -> CommandResult {
    let _ = ctx;
    Ok(serde_json::json!({
        "commands": crate::registry::COMMAND_NAMES,
    }))
}

pub async fn create_channel(ctx: &CommandContext) -> CommandResult {
    let a: CreateChannelArgs = args::parse_args("create_channel", &ctx.args)
        .map_err(|e| validation_error("create_channel", e))?;
    ctx.rooms
        .create_channel(ctx.tenant_id(), &a.room, &a.channel, ctx.client_id(), a.description)
        .map_err(|e| ErrorShape::new(error_codes::COMMAND_VALIDATION_ERROR, e.to_string()))?;
    ctx.emit_lifecycle_event(&a.room, &a.channel, "channel.created", serde_json::json!({}));
    Ok(serde_json::json!({ "room": a.room, "channel": a.channel }))
}

pub async fn delete_channel(ctx: &CommandContext) -> CommandResult {
    if !ctx.principal.is_admin() {
        return Err(ErrorShape::new(
            error_codes::AUTHORIZATION_DENIED,
            "delete_channel requires the admin role",
        ));
    }
    let a: DeleteChannelArgs = args::parse_args("delete_channel", &ctx.args)
        .map_err(|e| validation_error("delete_channel", e))?;
    ctx.rooms
        .delete_channel(ctx.tenant_id(), &a.room, &a.channel)
        .map_err(|e| ErrorShape::new(error_codes::TARGET_NOT_FOUND, e.to_string()))?;
    Ok(serde_json::json!({ "room": a.room, "channel": a.channel, "deleted": true }))
}

pub async fn join_channel(ctx: &CommandContext) -> CommandResult {
    let a: JoinChannelArgs = args::parse_args("join_channel", &ctx.args)
        .map_err(|e| validation_error("join_channel", e))?;
    ctx.rooms
        .join_channel(ctx.tenant_id(), &a.room, &a.channel, ctx.client_id())
        .map_err(|e| ErrorShape::new(error_codes::COMMAND_VALIDATION_ERROR, e.to_string()))?;
    ctx.emit_lifecycle_event(&a.room, &a.channel, "member.joined", serde_json::json!({}));
    Ok(serde_json::json!({ "room": a.room, "channel": a.channel, "joined": true }))
}

pub async fn leave_channel(ctx: &CommandContext) -> CommandResult {
    let a: LeaveChannelArgs = args::parse_args("leave_channel", &ctx.args)
        .map_err(|e| validation_error("leave_channel", e))?;
    ctx.rooms.leave_channel(ctx.tenant_id(), &a.room, &a.channel, ctx.client_id());
    ctx.emit_lifecycle_event(&a.room, &a.channel, "member.left", serde_json::json!({}));
    Ok(serde_json::json!({ "room": a.room, "channel": a.channel, "left": true }))
}

pub async fn list_channels(ctx: &CommandContext) -> CommandResult {
    let a: ListChannelsArgs = args::parse_args("list_channels", &ctx.args)
        .map_err(|e| validation_error("list_channels", e))?;
    let channels: Vec<_> = ctx
        .rooms
        .list_channels(ctx.tenant_id(), &a.room)
        .iter()
        .map(channel_info_json)
        .collect();
    Ok(serde_json::json!({ "room": a.room, "channels": channels }))
}

pub async fn channel_info(ctx: &CommandContext) -> CommandResult {
    let a: ChannelInfoArgs = args::parse_args("channel_info", &ctx.args)
        .map_err(|e| validation_error("channel_info", e))?;
    let info = ctx
        .rooms
        .channel_info(ctx.tenant_id(), &a.room, &a.channel)
        .map_err(|e| ErrorShape::new(error_codes::TARGET_NOT_FOUND, e.to_string()))?;
    Ok(channel_info_json(&info))
}

/// Shared by `op.history.get`/`history.get`. Non-admin callers must name a
/// `room`/`channel`; only an admin may omit both for a global read across
/// every channel of the tenant (§4.6 "global history access is admin-only").
pub async fn history_get(ctx: &CommandContext) -> CommandResult {
    let a: HistoryGetArgs = args::parse_args("history.get", &ctx.args)
        .map_err(|e| validation_error("history.get", e))?;
    if !ctx.principal.has_role(Role::User) {
        return Err(ErrorShape::new(
            error_codes::AUTHORIZATION_DENIED,
            "history.get requires at least the user role",
        ));
    }
    match (&a.room, &a.channel) {
        (Some(room), Some(channel)) => {
            let key = HistoryKey::new(ctx.tenant_id(), room, channel);
            let entries = ctx.history.get(&key, a.since, a.until, a.limit);
            Ok(serde_json::json!({ "room": room, "channel": channel, "entries": entries }))
        },
        (None, None) if ctx.principal.is_admin() => {
            let scoped = ctx.history.get_all_for_tenant(ctx.tenant_id(), a.since, a.until, a.limit);
            Ok(serde_json::json!({ "scope": "global", "results": scoped_json(&scoped) }))
        },
        (None, None) => Err(ErrorShape::new(
            error_codes::AUTHORIZATION_DENIED,
            "history.get: non-admin callers must provide room and channel",
        )),
        _ => Err(validation_error("history.get", "room and channel must both be set or both omitted")),
    }
}

pub async fn history_replay(ctx: &CommandContext) -> CommandResult {
    let a: HistoryReplayArgs = args::parse_args("history.replay", &ctx.args)
        .map_err(|e| validation_error("history.replay", e))?;
    if !ctx.principal.has_role(Role::User) {
        return Err(ErrorShape::new(
            error_codes::AUTHORIZATION_DENIED,
            "history.replay requires at least the user role",
        ));
    }
    match (&a.room, &a.channel) {
        (Some(room), Some(channel)) => {
            let key = HistoryKey::new(ctx.tenant_id(), room, channel);
            let entries = ctx
                .history
                .replay(&key, a.from_ts, a.to_ts, a.strict_sequence, a.limit)
                .map_err(|e| ErrorShape::new(error_codes::COMMAND_VALIDATION_ERROR, e.to_string()))?;
            Ok(serde_json::json!({ "room": room, "channel": channel, "entries": entries }))
        },
        (None, None) if ctx.principal.is_admin() => {
            let scoped = ctx
                .history
                .replay_all_for_tenant(ctx.tenant_id(), a.from_ts, a.to_ts, a.strict_sequence, a.limit)
                .map_err(|e| ErrorShape::new(error_codes::COMMAND_VALIDATION_ERROR, e.to_string()))?;
            Ok(serde_json::json!({ "scope": "global", "results": scoped_json(&scoped) }))
        },
        (None, None) => Err(ErrorShape::new(
            error_codes::AUTHORIZATION_DENIED,
            "history.replay: non-admin callers must provide room and channel",
        )),
        _ => Err(validation_error("history.replay", "room and channel must both be set or both omitted")),
    }
}

fn scoped_json(scoped: &[(arqonbus_history::HistoryKey, Vec<arqonbus_history::HistoryEntry>)]) -> serde_json::Value {
    serde_json::json!(
        scoped
            .iter()
            .map(|(key, entries)| serde_json::json!({
                "room": key.room,
                "channel": key.channel,
                "entries": entries,
            }))
            .collect::<Vec<_>>()
    )
}
