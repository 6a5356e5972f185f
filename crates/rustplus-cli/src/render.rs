//! Plain-text rendering of query results.

use rustplus_core::types::{ChatMessage, MapInfo, MapMarker, ServerInfo, TeamInfo, TimeInfo};
use rustplus_core::{EntityPayload, EntitySnapshot, ResolutionState};

pub fn server_info(info: &ServerInfo) -> String {
    let mut out = format!(
        "{}\nmap: {} ({}m)\nplayers: {}/{}",
        info.name, info.map, info.map_size, info.players, info.max_players
    );
    if info.queued_players > 0 {
        out.push_str(&format!(" (+{} queued)", info.queued_players));
    }
    if !info.url.is_empty() {
        out.push_str(&format!("\nurl: {}", info.url));
    }
    out
}

/// `time` as HH:MM, given in-game hours as a fraction.
pub fn clock(hours: f32) -> String {
    let total = (hours.rem_euclid(24.0) * 60.0).round() as u32 % (24 * 60);
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub fn time(info: &TimeInfo) -> String {
    let phase = if info.time >= info.sunrise && info.time < info.sunset {
        "day"
    } else {
        "night"
    };
    format!(
        "{} ({phase})\nsunrise {}  sunset {}\nday length {} min",
        clock(info.time),
        clock(info.sunrise),
        clock(info.sunset),
        info.day_length_minutes
    )
}

pub fn map(info: &MapInfo) -> String {
    let mut out = format!("{}x{} (ocean margin {})", info.width, info.height, info.ocean_margin);
    for monument in &info.monuments {
        out.push_str(&format!("\n  {:<32} {:>7.1} {:>7.1}", monument.token, monument.x, monument.y));
    }
    out
}

pub fn markers(markers: &[MapMarker]) -> String {
    if markers.is_empty() {
        return "no markers".to_string();
    }
    markers
        .iter()
        .map(|m| {
            let label = if m.name.is_empty() { "-" } else { m.name.as_str() };
            format!("{:>8}  type {:<2} {:>7.1} {:>7.1}  {label}", m.id, m.marker_type, m.x, m.y)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn team(info: &TeamInfo) -> String {
    let mut lines = Vec::with_capacity(info.members.len());
    for member in &info.members {
        let leader = if member.steam_id == info.leader_steam_id { "*" } else { " " };
        let status = match (member.is_online, member.is_alive) {
            (false, _) => "offline",
            (true, true) => "alive",
            (true, false) => "dead",
        };
        lines.push(format!("{leader} {:<24} {status}", member.name));
    }
    if lines.is_empty() {
        return "no team".to_string();
    }
    lines.join("\n")
}

pub fn chat_line(message: &ChatMessage) -> String {
    let at = message
        .sent_at()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!("[{at}] {}: {}", message.name, message.message)
}

pub fn entity(snapshot: &EntitySnapshot) -> String {
    let kind = match snapshot.state {
        ResolutionState::Resolved(t) => t.as_str(),
        ResolutionState::Resolving => "resolving",
        ResolutionState::Referenced => "unknown",
    };
    let mut out = format!("{} \"{}\": {kind}", snapshot.id, snapshot.name);
    if let Some(value) = &snapshot.value {
        out.push(' ');
        out.push_str(&payload(value));
    }
    out
}

pub fn payload(payload: &EntityPayload) -> String {
    let mut parts = Vec::new();
    if let Some(on) = payload.value {
        parts.push(if on { "on".to_string() } else { "off".to_string() });
    }
    if let Some(capacity) = payload.capacity {
        parts.push(format!("{}/{capacity} slots", payload.items.len()));
    }
    if payload.has_protection == Some(true) {
        parts.push("protected".to_string());
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustplus_core::EntityType;
    use rustplus_core::types::{StorageItem, TeamMember};

    #[test]
    fn clock_formats_fractional_hours() {
        assert_eq!(clock(0.0), "00:00");
        assert_eq!(clock(7.5), "07:30");
        assert_eq!(clock(23.999), "00:00");
        assert_eq!(clock(13.25), "13:15");
    }

    #[test]
    fn team_marks_leader_and_status() {
        let member = |steam_id, name: &str, is_online, is_alive| TeamMember {
            steam_id,
            name: name.to_string(),
            x: 0.0,
            y: 0.0,
            is_online,
            is_alive,
            spawn_time: 0,
            death_time: 0,
        };
        let info = TeamInfo {
            leader_steam_id: 1,
            members: vec![member(1, "alpha", true, true), member(2, "beta", false, false)],
        };
        let out = team(&info);
        assert!(out.lines().next().unwrap().starts_with("* alpha"));
        assert!(out.contains("offline"));
        assert_eq!(team(&TeamInfo::default()), "no team");
    }

    #[test]
    fn entity_with_storage_payload() {
        let snapshot = EntitySnapshot {
            id: 9,
            name: "loot".into(),
            state: ResolutionState::Resolved(EntityType::StorageMonitor),
            value: Some(EntityPayload {
                value: Some(true),
                items: vec![StorageItem { item_id: 1, quantity: 5, item_is_blueprint: false }],
                capacity: Some(30),
                has_protection: Some(true),
                protection_expiry: None,
            }),
        };
        assert_eq!(entity(&snapshot), "9 \"loot\": storage_monitor on, 1/30 slots, protected");
    }

    #[test]
    fn unresolved_entity_without_value() {
        let snapshot = EntitySnapshot {
            id: 3,
            name: "door".into(),
            state: ResolutionState::Resolving,
            value: None,
        };
        assert_eq!(entity(&snapshot), "3 \"door\": resolving");
    }
}
