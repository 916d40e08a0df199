pub mod collect;
pub mod controller;
pub mod loop_worker;
pub mod window;

pub use collect::{classify_live, live_speed_ratio, Collector, CycleOutcome, LocationFailure};
pub use controller::CrawlerController;
pub use loop_worker::{crawl_loop, local_clock, run_cycle, Clock, CrawlSettings, CycleSummary};
pub use window::ActiveWindow;
