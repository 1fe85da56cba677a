pub mod email;
pub mod name;
pub mod phone;

use haven_db::vendors::models::Vendor;

use crate::trace::ScorerResult;

pub trait Scorer {
    fn name(&self) -> &'static str;
    fn score(&self, a: &Vendor, b: &Vendor) -> ScorerResult;
}
