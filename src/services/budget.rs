use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::models::expenses::Expense;

/// Monthly allowance pools. The payroll pool only absorbs spend once the
/// company pool is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct BudgetPools {
    pub company: f64,
    pub payroll: f64,
}

impl BudgetPools {
    pub fn total(&self) -> f64 {
        self.company + self.payroll
    }
}

impl Default for BudgetPools {
    fn default() -> Self {
        Self {
            company: 200.0,
            payroll: 20.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetLevel {
    Green,
    Amber,
    Red,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceSummary {
    pub total_spent: f64,
    pub spent: f64,
    pub remaining: f64,
    pub company_used: f64,
    pub payroll_used: f64,
    pub percentage: f64,
    pub over_budget: bool,
    pub level: BudgetLevel,
}

impl BalanceSummary {
    pub fn compute(total_spent: f64, pools: BudgetPools) -> Self {
        let spent = total_spent.abs();
        let remaining = pools.company - spent;
        let company_used = spent.min(pools.company);
        let payroll_used = (spent - pools.company).max(0.0).min(pools.payroll);
        let percentage = if pools.company > 0.0 {
            spent / pools.company * 100.0
        } else {
            0.0
        };
        let over_budget = remaining < 0.0;

        let level = if over_budget || percentage > 100.0 {
            BudgetLevel::Red
        } else if percentage >= 80.0 {
            BudgetLevel::Amber
        } else {
            BudgetLevel::Green
        };

        Self {
            total_spent,
            spent,
            remaining,
            company_used,
            payroll_used,
            percentage,
            over_budget,
            level,
        }
    }
}

pub fn total_spent(expenses: &[Expense]) -> f64 {
    expenses
        .iter()
        .filter(|e| e.counts_toward_spend())
        .fold(0.0, |total, e| total + e.amount)
}

pub fn summarize(expenses: &[Expense], pools: BudgetPools) -> BalanceSummary {
    BalanceSummary::compute(total_spent(expenses), pools)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DaySummary {
    pub expenses: Vec<Expense>,
    pub total_spent: f64,
}

pub fn daily_totals(expenses: &[Expense]) -> BTreeMap<NaiveDate, DaySummary> {
    let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();

    for expense in expenses {
        let Some(day) = expense.day() else {
            log::warn!("Skipping expense {} with unreadable date {:?}", expense.id, expense.date);
            continue;
        };

        let summary = days.entry(day).or_default();
        if expense.counts_toward_spend() {
            summary.total_spent += expense.amount.abs();
        }
        summary.expenses.push(expense.clone());
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::expenses::{expense, ExpenseStatus};

    const POOLS: BudgetPools = BudgetPools {
        company: 200.0,
        payroll: 20.0,
    };

    #[test]
    fn example_month() {
        let expenses = vec![
            expense("1", -50.0, ExpenseStatus::Complete),
            expense("2", -30.0, ExpenseStatus::Rejected),
            expense("3", 20.0, ExpenseStatus::Refunded),
        ];

        assert_eq!(total_spent(&expenses), -50.0);

        let summary = summarize(&expenses, POOLS);
        assert_eq!(summary.remaining, 150.0);
        assert_eq!(summary.percentage, 25.0);
        assert!(!summary.over_budget);
        assert_eq!(summary.level, BudgetLevel::Green);
    }

    #[test]
    fn mixed_fixture_total_matches_filter() {
        let mut unapproved = expense("4", -7.0, ExpenseStatus::Pending);
        unapproved.approved = Some(false);
        let mut complete_unapproved = expense("5", -3.0, ExpenseStatus::Complete);
        complete_unapproved.approved = Some(false);

        let expenses = vec![
            expense("1", -10.0, ExpenseStatus::Complete),
            expense("2", -20.0, ExpenseStatus::Declined),
            expense("3", -5.0, ExpenseStatus::Pending),
            unapproved,
            complete_unapproved,
            expense("6", -11.0, ExpenseStatus::Reversed),
            expense("7", 9.0, ExpenseStatus::Refunded),
        ];

        assert_eq!(total_spent(&expenses), -18.0);
        assert_eq!(total_spent(&[]), 0.0);
    }

    #[test]
    fn nothing_counted_is_positive_zero() {
        let excluded = vec![
            expense("1", -30.0, ExpenseStatus::Rejected),
            expense("2", -4.0, ExpenseStatus::Declined),
        ];
        for expenses in [&[][..], &excluded[..]] {
            let total = total_spent(expenses);
            assert!(total.is_sign_positive());
            assert_eq!(format!("{}", total), "0");
            assert_eq!(format!("{}", summarize(expenses, POOLS).total_spent), "0");
        }
    }

    #[test]
    fn status_filter_matches_wire_strings_exactly() {
        let parse = |status: &str, approved: Option<bool>| -> Expense {
            serde_json::from_value(serde_json::json!({
                "id": "9",
                "amount": -10.0,
                "date": "2025-03-02T09:00:00Z",
                "status": status,
                "approved": approved
            }))
            .unwrap()
        };

        for raw in ["reject", "declined", "reversed", "refunded", "Settled"] {
            let fresh = parse(raw, None);
            assert_eq!(total_spent(&[fresh.clone()]), -10.0, "{} should count", raw);

            let cached: Expense =
                serde_json::from_str(&serde_json::to_string(&fresh).unwrap()).unwrap();
            assert_eq!(cached, fresh);
            assert_eq!(total_spent(&[cached]), -10.0, "{} should count after caching", raw);
        }

        for raw in ["rejected", "DECLINE", "reverse", "refund"] {
            assert_eq!(total_spent(&[parse(raw, Some(true))]), 0.0, "{} is excluded", raw);
        }

        assert_eq!(total_spent(&[parse("completed", Some(false))]), 0.0);
        assert_eq!(total_spent(&[parse("Complete", Some(false))]), -10.0);
    }

    #[test]
    fn overspend_goes_negative_and_uses_payroll() {
        let summary = BalanceSummary::compute(-212.0, POOLS);
        assert_eq!(summary.remaining, -12.0);
        assert!(summary.over_budget);
        assert_eq!(summary.company_used, 200.0);
        assert_eq!(summary.payroll_used, 12.0);
        assert_eq!(summary.level, BudgetLevel::Red);

        let summary = BalanceSummary::compute(-500.0, POOLS);
        assert_eq!(summary.payroll_used, 20.0);
        assert_eq!(summary.percentage, 250.0);
    }

    #[test]
    fn levels_follow_thresholds() {
        assert_eq!(BalanceSummary::compute(-159.0, POOLS).level, BudgetLevel::Green);
        assert_eq!(BalanceSummary::compute(-160.0, POOLS).level, BudgetLevel::Amber);
        assert_eq!(BalanceSummary::compute(-200.0, POOLS).level, BudgetLevel::Amber);
        assert_eq!(BalanceSummary::compute(-200.5, POOLS).level, BudgetLevel::Red);
    }

    #[test]
    fn zero_company_budget_has_no_percentage() {
        let pools = BudgetPools {
            company: 0.0,
            payroll: 20.0,
        };
        let summary = BalanceSummary::compute(-5.0, pools);
        assert_eq!(summary.percentage, 0.0);
        assert!(summary.over_budget);
        assert_eq!(summary.payroll_used, 5.0);
        assert_eq!(pools.total(), 20.0);
    }

    #[test]
    fn daily_totals_group_and_filter() {
        let mut a = expense("1", -10.0, ExpenseStatus::Complete);
        a.date = "2025-03-02T09:00:00Z".to_string();
        let mut b = expense("2", -4.0, ExpenseStatus::Declined);
        b.date = "2025-03-02T18:00:00Z".to_string();
        let mut c = expense("3", -6.5, ExpenseStatus::Pending);
        c.date = "2025-03-05T10:00:00Z".to_string();
        let mut broken = expense("4", -1.0, ExpenseStatus::Complete);
        broken.date = "not a date".to_string();

        let days = daily_totals(&[a, b, c, broken]);
        assert_eq!(days.len(), 2);

        let second = &days[&NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()];
        assert_eq!(second.expenses.len(), 2);
        assert_eq!(second.total_spent, 10.0);

        let fifth = &days[&NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()];
        assert_eq!(fifth.total_spent, 6.5);
    }
}
