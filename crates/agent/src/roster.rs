use teeclaim_core::TargetKind;

use crate::arbiter::RaceSnapshot;
use crate::plan::RunPlan;

/// Partners `booker` adds when booking `kind`, in roster order.
///
/// The booker is never added. Once the Fourball is confirmed, the Twoball
/// is filled from everyone rostered on either target who is not already in
/// the Fourball party.
pub fn partners_for(plan: &RunPlan, kind: TargetKind, booker: &str, race: &RaceSnapshot) -> Vec<String> {
    let target = plan.target(kind);
    let needed = usize::from(target.required_slots.saturating_sub(1));

    let excluded: &[String] = match kind {
        TargetKind::Twoball => race.confirmed_party(TargetKind::Fourball).unwrap_or(&[]),
        TargetKind::Fourball => &[],
    };
    let pool: Vec<&String> = if excluded.is_empty() {
        target.roster.iter().collect()
    } else {
        target
            .roster
            .iter()
            .chain(plan.target(TargetKind::Fourball).roster.iter())
            .collect()
    };

    let mut partners: Vec<String> = Vec::with_capacity(needed);
    for member in pool {
        if partners.len() == needed {
            break;
        }
        if member == booker || excluded.contains(member) || partners.contains(member) {
            continue;
        }
        partners.push(member.clone());
    }
    partners
}
