pub mod daily;
pub mod holders;
pub mod net_flow;
pub mod trading;

pub use daily::{daily_stats, DailyFill, DailyStat};
pub use holders::{holder_summary, history_point, top_holders, HistoryPoint, HolderRow, HolderSummary};
pub use net_flow::{flow_summary, FlowSummary};
pub use trading::{trading_summary, SideStats, TradingStats, TradingSummary};
