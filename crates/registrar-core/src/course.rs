use std::collections::BTreeSet;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::ids::CourseCode;

/// One weekly meeting pattern of a course, e.g. Sun/Tue 10:00-11:20.
///
/// The interval is half-open: a slot ending at 11:00 does not overlap one
/// starting at 11:00.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SlotFields")]
pub struct TimeSlot {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Wire form of a slot; normalized through `TimeSlot::new`.
#[derive(Deserialize)]
struct SlotFields {
    days: Vec<Weekday>,
    start: NaiveTime,
    end: NaiveTime,
}

impl From<SlotFields> for TimeSlot {
    fn from(fields: SlotFields) -> Self {
        TimeSlot::new(fields.days, fields.start, fields.end)
    }
}

impl TimeSlot {
    /// Create a slot. Days are deduplicated and sorted from Monday.
    pub fn new(days: impl IntoIterator<Item = Weekday>, start: NaiveTime, end: NaiveTime) -> Self {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        Self { days, start, end }
    }

    /// Parse the catalog notation: days separated by '/' or ',' and HH:MM times.
    pub fn parse(days: &str, start: &str, end: &str) -> Result<Self, CatalogError> {
        let mut parsed = Vec::new();
        for token in days.split(['/', ',']) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let day = token
                .parse::<Weekday>()
                .map_err(|_| CatalogError::InvalidCourse(format!("unknown weekday '{}'", token)))?;
            parsed.push(day);
        }

        let start = parse_time(start)?;
        let end = parse_time(end)?;
        Ok(Self::new(parsed, start, end))
    }

    /// Whether this slot meets on the given day.
    pub fn meets_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }

    /// The first shared weekday on which the two intervals overlap.
    pub fn overlap_day(&self, other: &TimeSlot) -> Option<Weekday> {
        if !(self.start < other.end && other.start < self.end) {
            return None;
        }
        self.days.iter().copied().find(|d| other.meets_on(*d))
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, CatalogError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| CatalogError::InvalidCourse(format!("invalid time '{}'", value)))
}

/// A catalog entry. Read-only to the registration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: CourseCode,
    pub name: String,
    pub credits: u32,
    pub schedule: Vec<TimeSlot>,
    pub room: String,
    pub capacity: u32,
    #[serde(default)]
    pub prerequisites: BTreeSet<CourseCode>,
}

impl Course {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        credits: u32,
        schedule: Vec<TimeSlot>,
        room: impl Into<String>,
        capacity: u32,
    ) -> Self {
        Self {
            code: CourseCode::new(code),
            name: name.into(),
            credits,
            schedule,
            room: room.into(),
            capacity,
            prerequisites: BTreeSet::new(),
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites
            .into_iter()
            .map(|p| CourseCode::new(p))
            .collect();
        self
    }

    /// The weekday of the first overlapping pair of slots, if any.
    /// `a.conflicts_with(b).is_some() == b.conflicts_with(a).is_some()`.
    pub fn conflicts_with(&self, other: &Course) -> Option<Weekday> {
        self.schedule
            .iter()
            .flat_map(|a| other.schedule.iter().map(move |b| (a, b)))
            .find_map(|(a, b)| a.overlap_day(b))
    }
}

/// Allowed edits to an existing course. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub credits: Option<u32>,
    pub schedule: Option<Vec<TimeSlot>>,
    pub room: Option<String>,
    pub capacity: Option<u32>,
}

impl CoursePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.credits.is_none()
            && self.schedule.is_none()
            && self.room.is_none()
            && self.capacity.is_none()
    }

    /// Return a copy of `course` with the patch applied.
    pub fn apply(&self, course: &Course) -> Course {
        let mut patched = course.clone();
        if let Some(name) = &self.name {
            patched.name = name.clone();
        }
        if let Some(credits) = self.credits {
            patched.credits = credits;
        }
        if let Some(schedule) = &self.schedule {
            patched.schedule = schedule.clone();
        }
        if let Some(room) = &self.room {
            patched.room = room.clone();
        }
        if let Some(capacity) = self.capacity {
            patched.capacity = capacity;
        }
        patched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(days: &str, start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(days, start, end).unwrap()
    }

    fn course(code: &str, slots: Vec<TimeSlot>) -> Course {
        Course::new(code, code, 3, slots, "B-23", 40)
    }

    #[test]
    fn test_parse_slot() {
        let s = slot("Sun/Tue", "10:00", "11:20");
        assert_eq!(s.days, vec![Weekday::Tue, Weekday::Sun]);
        assert_eq!(s.duration_minutes(), 80);
    }

    #[test]
    fn test_parse_slot_rejects_bad_input() {
        assert!(TimeSlot::parse("Funday", "10:00", "11:00").is_err());
        assert!(TimeSlot::parse("Mon", "25:00", "11:00").is_err());
    }

    #[test]
    fn test_identical_slots_conflict() {
        let a = course("EE250", vec![slot("Mon", "10:00", "11:20")]);
        let b = course("EE201", vec![slot("Mon", "10:00", "11:20")]);
        assert_eq!(a.conflicts_with(&b), Some(Weekday::Mon));
    }

    #[test]
    fn test_touching_slots_do_not_conflict() {
        let a = course("EE250", vec![slot("Mon", "10:00", "11:00")]);
        let b = course("EE201", vec![slot("Mon", "11:00", "12:00")]);
        assert_eq!(a.conflicts_with(&b), None);
        assert_eq!(b.conflicts_with(&a), None);
    }

    #[test]
    fn test_different_days_do_not_conflict() {
        let a = course("EE250", vec![slot("Mon/Wed", "10:00", "11:20")]);
        let b = course("EE201", vec![slot("Tue/Thu", "10:00", "11:20")]);
        assert_eq!(a.conflicts_with(&b), None);
    }

    #[test]
    fn test_conflict_is_symmetric() {
        let a = course(
            "EE250",
            vec![slot("Sun/Tue", "08:00", "09:20"), slot("Thu", "13:00", "14:50")],
        );
        let b = course("EE311", vec![slot("Mon/Thu", "14:00", "15:00")]);
        let c = course("EE300", vec![slot("Wed", "08:00", "09:20")]);

        for (x, y) in [(&a, &b), (&a, &c), (&b, &c)] {
            assert_eq!(x.conflicts_with(y).is_some(), y.conflicts_with(x).is_some());
        }
        assert_eq!(a.conflicts_with(&b), Some(Weekday::Thu));
    }

    #[test]
    fn test_patch_apply() {
        let original = course("EE201", vec![slot("Mon", "10:00", "11:00")]);
        let patch = CoursePatch {
            name: Some("Circuits I".to_string()),
            credits: Some(4),
            room: Some("B-24".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());

        let patched = patch.apply(&original);
        assert_eq!(patched.name, "Circuits I");
        assert_eq!(patched.credits, 4);
        assert_eq!(patched.room, "B-24");
        assert_eq!(patched.capacity, original.capacity);
        assert_eq!(patched.schedule, original.schedule);
    }

    #[test]
    fn test_course_serde() {
        let c = course("EE250", vec![slot("Mon", "10:00", "11:20")]).with_prerequisites(["EE201"]);
        let json = serde_json::to_string(&c).unwrap();
        let back: Course = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_deserialized_slot_days_normalized() {
        let json = r#"{"days":["Sun","Mon","Sun"],"start":"10:00:00","end":"11:20:00"}"#;
        let slot: TimeSlot = serde_json::from_str(json).unwrap();
        assert_eq!(slot.days, vec![Weekday::Mon, Weekday::Sun]);
        assert_eq!(slot, TimeSlot::parse("Sun/Mon", "10:00", "11:20").unwrap());
    }
}
