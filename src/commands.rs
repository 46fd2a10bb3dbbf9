//! DTMF command table and announcement text generation.
//!
//! Commands are 4-digit codes mapped to actions. The table ships with fixed
//! defaults and can be replaced wholesale by a JSON file of
//! `{"code": "action"}` entries, where an action is `weather`, `time`, or
//! `custom-1` through `custom-8`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};

pub const CUSTOM_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Weather,
    Time,
    /// 1-based custom message slot.
    Custom(u8),
}

impl Action {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "weather" => Ok(Self::Weather),
            "time" => Ok(Self::Time),
            other => {
                if let Some(slot) = other.strip_prefix("custom-") {
                    let slot: u8 = slot
                        .parse()
                        .with_context(|| format!("bad custom slot in action '{other}'"))?;
                    if slot == 0 || slot as usize > CUSTOM_SLOTS {
                        bail!("custom slot must be 1-{CUSTOM_SLOTS}, got {slot}");
                    }
                    return Ok(Self::Custom(slot));
                }
                bail!("unknown action '{other}'");
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Weather => "weather".into(),
            Self::Time => "time".into(),
            Self::Custom(slot) => format!("custom-{slot}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandTable {
    map: HashMap<String, Action>,
}

impl CommandTable {
    /// The stock code assignment: 0001 weather, 0002 time, 0003-0010 the
    /// custom slots.
    pub fn defaults() -> Self {
        let mut map = HashMap::new();
        map.insert("0001".into(), Action::Weather);
        map.insert("0002".into(), Action::Time);
        for slot in 1..=CUSTOM_SLOTS as u8 {
            map.insert(format!("{:04}", slot as u16 + 2), Action::Custom(slot));
        }
        Self { map }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read command table {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid command table {}", path.display()))?;
        let mut map = HashMap::new();
        for (code, action) in entries {
            if code.len() != 4 || !code.chars().all(|c| c.is_ascii_digit()) {
                bail!("command code '{code}' is not 4 decimal digits");
            }
            map.insert(code, Action::parse(&action)?);
        }
        Ok(Self { map })
    }

    pub fn lookup(&self, code: &str) -> Option<Action> {
        self.map.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Operator-configured text behind each action, plus station identification.
#[derive(Debug, Clone)]
pub struct AnnouncementTexts {
    pub callsign: String,
    /// Weather is an external collaborator; this is its latest text, if any.
    pub weather_text: Option<String>,
    pub custom_messages: Vec<String>,
}

impl AnnouncementTexts {
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            weather_text: None,
            custom_messages: Vec::new(),
        }
    }

    pub fn resolve(&self, action: Action) -> String {
        self.resolve_at(action, Local::now())
    }

    pub fn resolve_at(&self, action: Action, now: DateTime<Local>) -> String {
        match action {
            Action::Weather => self
                .weather_text
                .clone()
                .unwrap_or_else(|| "Weather information unavailable".into()),
            Action::Time => {
                format!("The current time is {}", now.format("%I:%M %p"))
            }
            Action::Custom(slot) => self
                .custom_messages
                .get(slot as usize - 1)
                .filter(|m| !m.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("Custom message {slot} is not configured")),
        }
    }

    pub fn station_id(&self) -> String {
        self.station_id_at(Local::now())
    }

    pub fn station_id_at(&self, now: DateTime<Local>) -> String {
        format!(
            "This is {}. The time is {} on {}.",
            self.callsign,
            now.format("%I:%M %p"),
            now.format("%B %d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 12, 30, 0).unwrap()
    }

    #[test]
    fn default_table_covers_all_codes() {
        let table = CommandTable::defaults();
        assert_eq!(table.lookup("0001"), Some(Action::Weather));
        assert_eq!(table.lookup("0002"), Some(Action::Time));
        assert_eq!(table.lookup("0003"), Some(Action::Custom(1)));
        assert_eq!(table.lookup("0010"), Some(Action::Custom(8)));
        assert_eq!(table.lookup("9999"), None);
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn action_parse_round_trips() {
        for name in ["weather", "time", "custom-1", "custom-8"] {
            assert_eq!(Action::parse(name).unwrap().name(), name);
        }
        assert!(Action::parse("custom-0").is_err());
        assert!(Action::parse("custom-9").is_err());
        assert!(Action::parse("echo").is_err());
    }

    #[test]
    fn time_text_formats_twelve_hour_clock() {
        let texts = AnnouncementTexts::new("N0CALL");
        let text = texts.resolve_at(Action::Time, noon());
        assert_eq!(text, "The current time is 12:30 PM");
    }

    #[test]
    fn weather_falls_back_when_unconfigured() {
        let mut texts = AnnouncementTexts::new("N0CALL");
        assert_eq!(
            texts.resolve_at(Action::Weather, noon()),
            "Weather information unavailable"
        );
        texts.weather_text = Some("Clear skies, 70 degrees".into());
        assert_eq!(
            texts.resolve_at(Action::Weather, noon()),
            "Clear skies, 70 degrees"
        );
    }

    #[test]
    fn custom_slots_report_when_empty() {
        let mut texts = AnnouncementTexts::new("N0CALL");
        texts.custom_messages = vec!["Net at eight".into()];
        assert_eq!(texts.resolve_at(Action::Custom(1), noon()), "Net at eight");
        assert_eq!(
            texts.resolve_at(Action::Custom(2), noon()),
            "Custom message 2 is not configured"
        );
    }

    #[test]
    fn station_id_names_callsign_and_date() {
        let texts = AnnouncementTexts::new("W1AW");
        let id = texts.station_id_at(noon());
        assert!(id.starts_with("This is W1AW."));
        assert!(id.contains("12:30 PM"));
        assert!(id.contains("March 14"));
    }
}
