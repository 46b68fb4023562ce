/// CSV export of carbon ledgers.
pub mod export;
