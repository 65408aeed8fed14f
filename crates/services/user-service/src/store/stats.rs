//! Aggregate statistics over the table.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use domain::{UserRole, NEW_USERS_MONTH_DAYS, NEW_USERS_WEEK_DAYS};

use super::persistence::primary_blob_size;
use super::table::UserTable;

/// Point-in-time summary of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_users: usize,
    pub active_users: usize,
    pub inactive_users: usize,
    pub users_by_role: BTreeMap<UserRole, usize>,
    pub new_users_this_week: usize,
    pub new_users_this_month: usize,
    pub users_with_orders: usize,
    /// Mean spend among users with at least one order
    pub average_order_value: f64,
    pub total_revenue: f64,
    /// Approximate size of the persisted primary blob
    pub storage_bytes: usize,
    pub capacity: usize,
    pub utilization_percent: f64,
}

impl UserStats {
    pub fn compute(table: &UserTable, capacity: usize, now: DateTime<Utc>) -> Self {
        let week_start = now - Duration::days(NEW_USERS_WEEK_DAYS);
        let month_start = now - Duration::days(NEW_USERS_MONTH_DAYS);

        let mut users_by_role: BTreeMap<UserRole, usize> =
            UserRole::ALL.iter().map(|r| (*r, 0)).collect();
        let mut active_users = 0;
        let mut new_users_this_week = 0;
        let mut new_users_this_month = 0;
        let mut users_with_orders = 0;
        let mut spend_with_orders = 0.0;
        let mut total_revenue = 0.0;

        for user in table.records() {
            *users_by_role.entry(user.role).or_default() += 1;
            if user.is_active {
                active_users += 1;
            }
            if user.created_at > week_start {
                new_users_this_week += 1;
            }
            if user.created_at > month_start {
                new_users_this_month += 1;
            }
            if user.stats.order_count > 0 {
                users_with_orders += 1;
                spend_with_orders += user.stats.total_spent;
            }
            total_revenue += user.stats.total_spent;
        }

        let total_users = table.len();
        let utilization_percent = if capacity == 0 {
            0.0
        } else {
            total_users as f64 / capacity as f64 * 100.0
        };

        Self {
            total_users,
            active_users,
            inactive_users: total_users - active_users,
            users_by_role,
            new_users_this_week,
            new_users_this_month,
            users_with_orders,
            average_order_value: spend_with_orders / users_with_orders.max(1) as f64,
            total_revenue,
            storage_bytes: primary_blob_size(table),
            capacity,
            utilization_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{NewUser, UpdateUser, UsageStats};

    #[test]
    fn test_fresh_users_without_orders() {
        let mut table = UserTable::new();
        let now = Utc::now();
        for i in 0..10 {
            table
                .insert_new(NewUser::new(format!("u{}@example.com", i), "U", "pw"), 100, now)
                .unwrap();
        }

        let stats = UserStats::compute(&table, 100, now);
        assert_eq!(stats.total_users, 10);
        assert_eq!(stats.new_users_this_week, 10);
        assert_eq!(stats.new_users_this_month, 10);
        assert_eq!(stats.users_with_orders, 0);
        assert_eq!(stats.average_order_value, 0.0);
        assert_eq!(stats.utilization_percent, 10.0);
        assert_eq!(stats.users_by_role[&UserRole::User], 10);
        assert_eq!(stats.users_by_role[&UserRole::Admin], 0);
        assert!(stats.storage_bytes > 0);
    }

    #[test]
    fn test_average_only_counts_buyers() {
        let mut table = UserTable::new();
        let now = Utc::now();
        let buyer = table
            .insert_new(NewUser::new("buyer@example.com", "B", "pw"), 10, now)
            .unwrap()
            .id;
        let browser = table
            .insert_new(NewUser::new("browser@example.com", "W", "pw"), 10, now)
            .unwrap()
            .id;

        let patch = |orders, spent| UpdateUser {
            stats: Some(UsageStats {
                order_count: orders,
                total_spent: spent,
                loyalty_points: 0,
            }),
            ..UpdateUser::default()
        };
        table.apply_update(buyer, patch(3, 300.0)).unwrap();
        table.apply_update(browser, patch(0, 0.0)).unwrap();
        table.set_active(browser, false);

        let stats = UserStats::compute(&table, 10, now);
        assert_eq!(stats.users_with_orders, 1);
        assert_eq!(stats.average_order_value, 300.0);
        assert_eq!(stats.total_revenue, 300.0);
        assert_eq!(stats.inactive_users, 1);
    }

    #[test]
    fn test_new_user_windows_are_strict() {
        let mut table = UserTable::new();
        let now = Utc::now();
        table
            .insert_new(
                NewUser::new("edge@example.com", "Edge", "pw"),
                10,
                now - Duration::days(NEW_USERS_WEEK_DAYS),
            )
            .unwrap();

        let stats = UserStats::compute(&table, 10, now);
        assert_eq!(stats.new_users_this_week, 0);
        assert_eq!(stats.new_users_this_month, 1);
    }
}
