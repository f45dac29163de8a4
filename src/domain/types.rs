use chrono::{DateTime, Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type OrderId = u64;
pub type UserId = u64;
pub type ItemId = u64;
pub type CategoryId = u64;
/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Coarse slot of the day an order was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl PartOfDay {
    /// Morning 05-11, afternoon 12-16, evening 17-20, night otherwise.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => PartOfDay::Morning,
            12..=16 => PartOfDay::Afternoon,
            17..=20 => PartOfDay::Evening,
            _ => PartOfDay::Night,
        }
    }
}

impl fmt::Display for PartOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartOfDay::Morning => write!(f, "morning"),
            PartOfDay::Afternoon => write!(f, "afternoon"),
            PartOfDay::Evening => write!(f, "evening"),
            PartOfDay::Night => write!(f, "night"),
        }
    }
}

impl FromStr for PartOfDay {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morning" => Ok(PartOfDay::Morning),
            "afternoon" => Ok(PartOfDay::Afternoon),
            "evening" => Ok(PartOfDay::Evening),
            "night" => Ok(PartOfDay::Night),
            _ => anyhow::bail!(
                "Invalid part of day: {}. Must be 'morning', 'afternoon', 'evening' or 'night'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayInWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayInWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayInWeek::Monday,
            Weekday::Tue => DayInWeek::Tuesday,
            Weekday::Wed => DayInWeek::Wednesday,
            Weekday::Thu => DayInWeek::Thursday,
            Weekday::Fri => DayInWeek::Friday,
            Weekday::Sat => DayInWeek::Saturday,
            Weekday::Sun => DayInWeek::Sunday,
        }
    }
}

/// Which time attributes a component groups or filters by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeFlags {
    pub part_of_day: bool,
    pub day_in_week: bool,
    pub month: bool,
}

impl TimeFlags {
    pub const NONE: TimeFlags = TimeFlags {
        part_of_day: false,
        day_in_week: false,
        month: false,
    };

    pub fn part_of_day() -> Self {
        Self {
            part_of_day: true,
            ..Self::NONE
        }
    }

    pub fn part_of_day_and_weekday() -> Self {
        Self {
            part_of_day: true,
            day_in_week: true,
            ..Self::NONE
        }
    }
}

/// Time attributes of an order or a rule. `None` fields are unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeContext {
    pub part_of_day: Option<PartOfDay>,
    pub day_in_week: Option<DayInWeek>,
    pub month: Option<u32>,
}

impl TimeContext {
    /// Keeps only the attributes enabled in `flags`.
    pub fn project(&self, flags: TimeFlags) -> TimeContext {
        TimeContext {
            part_of_day: self.part_of_day.filter(|_| flags.part_of_day),
            day_in_week: self.day_in_week.filter(|_| flags.day_in_week),
            month: self.month.filter(|_| flags.month),
        }
    }

    /// True when every attribute set on both sides agrees.
    pub fn is_compatible(&self, other: &TimeContext) -> bool {
        fn agrees<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        agrees(self.part_of_day, other.part_of_day)
            && agrees(self.day_in_week, other.day_in_week)
            && agrees(self.month, other.month)
    }

    /// Strict slice match: every attribute set on `self` must be set and equal on `slice`.
    pub fn selects(&self, slice: &TimeContext) -> bool {
        fn selected<T: PartialEq>(wanted: Option<T>, got: Option<T>) -> bool {
            match wanted {
                Some(w) => got == Some(w),
                None => true,
            }
        }

        selected(self.part_of_day, slice.part_of_day)
            && selected(self.day_in_week, slice.day_in_week)
            && selected(self.month, slice.month)
    }
}

/// Recommendation strategies the ensemble can blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    OrderAssociation,
    UserHistory,
    UserHistory2,
    TimeRelated,
}

impl Approach {
    pub const ALL: [Approach; 4] = [
        Approach::OrderAssociation,
        Approach::UserHistory,
        Approach::UserHistory2,
        Approach::TimeRelated,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Approach::OrderAssociation => "order_association",
            Approach::UserHistory => "user_history",
            Approach::UserHistory2 => "user_history2",
            Approach::TimeRelated => "time_related",
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Approach {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Approach::ALL
            .into_iter()
            .find(|a| a.name() == s.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown approach: {}", s))
    }
}

/// One purchased item. Rows sharing `order_id` form a basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub categories: BTreeSet<CategoryId>,
    pub timestamp: Timestamp,
    pub day_in_week: DayInWeek,
    pub part_of_day: PartOfDay,
    pub month: u32,
}

impl Order {
    /// Builds an order row, deriving the time frame attributes from `timestamp` (UTC).
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        item_id: ItemId,
        categories: BTreeSet<CategoryId>,
        timestamp: Timestamp,
    ) -> anyhow::Result<Self> {
        let created_at = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| anyhow::anyhow!("timestamp {} is out of range", timestamp))?;

        Ok(Self {
            order_id,
            user_id,
            item_id,
            categories,
            timestamp,
            day_in_week: created_at.weekday().into(),
            part_of_day: PartOfDay::from_hour(created_at.hour()),
            month: created_at.month(),
        })
    }

    pub fn time_context(&self) -> TimeContext {
        TimeContext {
            part_of_day: Some(self.part_of_day),
            day_in_week: Some(self.day_in_week),
            month: Some(self.month),
        }
    }
}

/// An item ranked by its support within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: ItemId,
    pub support: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFrequency {
    pub item: ItemId,
    pub count: usize,
}

/// Items purchased within one combination of time attributes.
///
/// `items` holds one entry per purchase, so an item bought three times in the
/// slice appears three times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlice {
    pub context: TimeContext,
    pub items: Vec<ItemId>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_derives_time_frame() {
        // 2021-03-05 18:30:00 UTC, a Friday
        let order = Order::new(1, 2, 3, BTreeSet::new(), 1_614_969_000).unwrap();
        assert_eq!(order.day_in_week, DayInWeek::Friday);
        assert_eq!(order.part_of_day, PartOfDay::Evening);
        assert_eq!(order.month, 3);
    }

    #[test]
    fn test_part_of_day_boundaries() {
        assert_eq!(PartOfDay::from_hour(4), PartOfDay::Night);
        assert_eq!(PartOfDay::from_hour(5), PartOfDay::Morning);
        assert_eq!(PartOfDay::from_hour(12), PartOfDay::Afternoon);
        assert_eq!(PartOfDay::from_hour(21), PartOfDay::Night);
    }

    #[test]
    fn test_context_projection_and_compatibility() {
        let full = TimeContext {
            part_of_day: Some(PartOfDay::Morning),
            day_in_week: Some(DayInWeek::Monday),
            month: Some(1),
        };
        let projected = full.project(TimeFlags::part_of_day());
        assert_eq!(projected.part_of_day, Some(PartOfDay::Morning));
        assert_eq!(projected.day_in_week, None);

        let evening = TimeContext {
            part_of_day: Some(PartOfDay::Evening),
            ..TimeContext::default()
        };
        assert!(!evening.is_compatible(&full));
        assert!(TimeContext::default().is_compatible(&full));
        assert!(projected.selects(&full));
        assert!(!full.selects(&projected));
    }

    #[test]
    fn test_approach_names_round_trip() {
        for approach in Approach::ALL {
            assert_eq!(approach.name().parse::<Approach>().unwrap(), approach);
        }
        assert!("collaborative".parse::<Approach>().is_err());
    }

    #[test]
    fn test_part_of_day_parsing() {
        assert_eq!("Morning".parse::<PartOfDay>().unwrap(), PartOfDay::Morning);
        assert!("noon".parse::<PartOfDay>().is_err());
    }
}
