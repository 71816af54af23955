use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::course::Course;
use crate::ids::CourseCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub course: CourseCode,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableDay {
    pub day: Weekday,
    pub entries: Vec<TimetableEntry>,
}

/// Weekly timetable: meeting days from Monday, entries sorted by start time.
/// Days without meetings are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timetable {
    pub days: Vec<TimetableDay>,
}

impl Timetable {
    pub fn build<'a>(courses: impl IntoIterator<Item = &'a Course>) -> Self {
        let mut week: [Vec<TimetableEntry>; 7] = Default::default();

        for course in courses {
            for slot in &course.schedule {
                for day in &slot.days {
                    week[day.num_days_from_monday() as usize].push(TimetableEntry {
                        start: slot.start,
                        end: slot.end,
                        course: course.code.clone(),
                        room: course.room.clone(),
                    });
                }
            }
        }

        let days = week
            .into_iter()
            .enumerate()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(idx, mut entries)| {
                entries.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.course.cmp(&b.course)));
                TimetableDay {
                    day: weekday_from_monday(idx),
                    entries,
                }
            })
            .collect();

        Self { days }
    }

    pub fn day(&self, day: Weekday) -> &[TimetableEntry] {
        self.days
            .iter()
            .find(|d| d.day == day)
            .map(|d| d.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

fn weekday_from_monday(idx: usize) -> Weekday {
    let mut day = Weekday::Mon;
    for _ in 0..idx {
        day = day.succ();
    }
    day
}
