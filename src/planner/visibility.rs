//! Rules deciding which tasks show up on a given day, and the figures the
//! day header displays.
//!
//! Two call sites disagree on delivery tasks and both rules are kept:
//! the planner list shows a delivery task on every day up to its deadline,
//! past days included, while the calendar only shows it between today and
//! the deadline. Callers pick one through [`DayView`].

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::data::{Task, TaskKind, TaskPatch};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DayView {
    #[default]
    Planner,
    Calendar,
}

pub fn visible_in_planner(task: &Task, date: NaiveDate) -> bool {
    match task.kind() {
        TaskKind::Permanent => true,
        TaskKind::Delivery => task.delivery_date.map_or(false, |deadline| date <= deadline),
        TaskKind::OneOff => task.date == Some(date),
    }
}

pub fn visible_in_calendar(task: &Task, date: NaiveDate, today: NaiveDate) -> bool {
    match task.kind() {
        TaskKind::Permanent => true,
        TaskKind::Delivery => task
            .delivery_date
            .map_or(false, |deadline| today <= date && date <= deadline),
        TaskKind::OneOff => task.date == Some(date),
    }
}

/// Whether the calendar puts a dot on `date` for this task. Deliveries only
/// mark their deadline.
pub fn marks_calendar_day(task: &Task, date: NaiveDate) -> bool {
    match task.kind() {
        TaskKind::Permanent => true,
        TaskKind::Delivery => task.delivery_date == Some(date),
        TaskKind::OneOff => task.date == Some(date),
    }
}

pub fn matches_search(task: &Task, query: &str) -> bool {
    query.is_empty() || task.text.to_lowercase().contains(&query.to_lowercase())
}

pub fn is_visible(task: &Task, date: NaiveDate, view: DayView, today: NaiveDate) -> bool {
    match view {
        DayView::Planner => visible_in_planner(task, date),
        DayView::Calendar => visible_in_calendar(task, date, today),
    }
}

pub fn filter_day<'a>(
    tasks: &'a [Task],
    date: NaiveDate,
    query: &str,
    view: DayView,
    today: NaiveDate,
) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| matches_search(task, query))
        .filter(|task| is_visible(task, date, view, today))
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayStats {
    pub total: usize,
    pub completed: usize,
    pub percentage: u8,
}

impl DayStats {
    pub fn compute(visible: &[&Task], date: NaiveDate) -> DayStats {
        let total = visible.len();
        let completed = visible
            .iter()
            .filter(|task| task.is_completed_on(date))
            .count();

        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };

        DayStats {
            total,
            completed,
            percentage,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryUrgency {
    DueToday,
    Urgent,
    OnTrack,
}

/// Signed number of days from `reference` to the task's deadline.
pub fn days_until_delivery(task: &Task, reference: NaiveDate) -> Option<i64> {
    match task.kind() {
        TaskKind::Delivery => task
            .delivery_date
            .map(|deadline| (deadline - reference).num_days()),
        _ => None,
    }
}

pub fn delivery_urgency(days_until: i64) -> DeliveryUrgency {
    if days_until == 0 {
        DeliveryUrgency::DueToday
    } else if days_until <= 3 {
        DeliveryUrgency::Urgent
    } else {
        DeliveryUrgency::OnTrack
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgendaEntry {
    pub task: Task,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<DeliveryUrgency>,
}

impl AgendaEntry {
    fn new(task: &Task, date: NaiveDate) -> AgendaEntry {
        let days_until = days_until_delivery(task, date);

        AgendaEntry {
            task: task.clone(),
            done: task.is_completed_on(date),
            days_until,
            urgency: days_until.map(delivery_urgency),
        }
    }
}

/// The three sections of the day list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayAgenda {
    pub date: NaiveDate,
    pub deliveries: Vec<AgendaEntry>,
    pub permanent: Vec<AgendaEntry>,
    pub day_tasks: Vec<AgendaEntry>,
    pub stats: DayStats,
}

impl DayAgenda {
    pub fn build(
        tasks: &[Task],
        date: NaiveDate,
        query: &str,
        view: DayView,
        today: NaiveDate,
    ) -> DayAgenda {
        let visible = filter_day(tasks, date, query, view, today);
        let stats = DayStats::compute(&visible, date);

        let mut agenda = DayAgenda {
            date,
            deliveries: vec![],
            permanent: vec![],
            day_tasks: vec![],
            stats,
        };

        for task in visible {
            let entry = AgendaEntry::new(task, date);
            match task.kind() {
                TaskKind::Delivery => agenda.deliveries.push(entry),
                TaskKind::Permanent => agenda.permanent.push(entry),
                TaskKind::OneOff => agenda.day_tasks.push(entry),
            }
        }

        agenda
    }
}

/// Patch that flips the completion of `task` on `date`.
pub fn toggle_patch(task: &Task, date: NaiveDate) -> TaskPatch {
    match task.kind() {
        TaskKind::Permanent => {
            let mut completed_dates = task.completed_dates.clone();
            if !completed_dates.remove(&date) {
                completed_dates.insert(date);
            }

            TaskPatch {
                completed_dates: Some(completed_dates),
                ..TaskPatch::default()
            }
        }
        TaskKind::OneOff | TaskKind::Delivery => TaskPatch {
            completed: Some(!task.completed),
            ..TaskPatch::default()
        },
    }
}

/// Monday to Sunday around `date`, or `None` when that week runs past the
/// representable calendar.
pub fn week_of(date: NaiveDate) -> Option<Vec<NaiveDate>> {
    let monday = date.checked_sub_days(Days::new(date.weekday().num_days_from_monday() as u64))?;
    (0..7)
        .map(|offset| monday.checked_add_days(Days::new(offset)))
        .collect()
}

/// Days of the given month that carry at least one calendar marker.
pub fn marked_days(tasks: &[Task], year: i32, month: u32) -> Vec<NaiveDate> {
    let first = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first) => first,
        None => return vec![],
    };

    first
        .iter_days()
        .take_while(|day| day.month() == month)
        .filter(|day| tasks.iter().any(|task| marks_calendar_day(task, *day)))
        .collect()
}
