use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::types::{BillingMonth, PaymentIntent, PaymentMethod, Room};

const REVENUE_MONTHS: usize = 6;
const TOP_ROOMS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: BillingMonth,
    pub revenue: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodBreakdown {
    pub method: PaymentMethod,
    pub count: usize,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub occupied: usize,
    pub available: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRevenue {
    pub room_id: String,
    pub room_number: String,
    pub revenue: u64,
}

/// Administrator overview across every payment and room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Last six billing months with payments, oldest first
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub payment_methods: Vec<MethodBreakdown>,
    pub occupancy: Occupancy,
    /// Highest-earning rooms, best first
    pub top_rooms: Vec<RoomRevenue>,
}

impl Report {
    /// Payments repeated in the input (same id) count once
    pub fn build(payments: &[PaymentIntent], rooms: &[Room]) -> Self {
        let mut seen = HashSet::new();
        let mut unique: Vec<&PaymentIntent> = Vec::with_capacity(payments.len());
        for p in payments {
            if seen.insert(p.payment_id.as_str()) {
                unique.push(p);
            }
        }
        let payments = unique;

        Self {
            monthly_revenue: monthly_revenue(&payments),
            payment_methods: payment_methods(&payments),
            occupancy: occupancy(rooms),
            top_rooms: top_rooms(&payments, rooms),
        }
    }
}

fn monthly_revenue(payments: &[&PaymentIntent]) -> Vec<MonthlyRevenue> {
    let mut by_month: BTreeMap<BillingMonth, u64> = BTreeMap::new();
    for p in payments {
        *by_month.entry(p.billing_month).or_default() += p.amount;
    }

    let skip = by_month.len().saturating_sub(REVENUE_MONTHS);
    by_month
        .into_iter()
        .skip(skip)
        .map(|(month, revenue)| MonthlyRevenue { month, revenue })
        .collect()
}

fn payment_methods(payments: &[&PaymentIntent]) -> Vec<MethodBreakdown> {
    let mut breakdown: Vec<MethodBreakdown> = Vec::new();
    for p in payments {
        match breakdown.iter_mut().find(|b| b.method == p.method) {
            Some(entry) => {
                entry.count += 1;
                entry.amount += p.amount;
            }
            None => breakdown.push(MethodBreakdown {
                method: p.method,
                count: 1,
                amount: p.amount,
            }),
        }
    }
    breakdown
}

fn occupancy(rooms: &[Room]) -> Occupancy {
    rooms.iter().fold(Occupancy::default(), |mut acc, room| {
        if room.is_available == Some(true) {
            acc.available += 1;
        } else {
            acc.occupied += 1;
        }
        acc
    })
}

fn top_rooms(payments: &[&PaymentIntent], rooms: &[Room]) -> Vec<RoomRevenue> {
    let mut revenue: HashMap<&str, (u64, Option<&str>)> = HashMap::new();
    for &p in payments {
        let Some(room) = p.room.as_ref() else {
            continue;
        };
        let entry = revenue.entry(room.id()).or_insert((0, None));
        entry.0 += p.amount;
        if entry.1.is_none() {
            entry.1 = room.room_number();
        }
    }

    let mut ranked: Vec<RoomRevenue> = revenue
        .into_iter()
        .map(|(room_id, (revenue, embedded_number))| {
            let room_number = rooms
                .iter()
                .find(|r| r.room_id == room_id)
                .map(|r| r.room_number.as_str())
                .or(embedded_number)
                .unwrap_or("Unknown")
                .to_string();
            RoomRevenue {
                room_id: room_id.to_string(),
                room_number,
                revenue,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.room_number.cmp(&b.room_number))
    });
    ranked.truncate(TOP_ROOMS);
    ranked
}
