pub mod aggregator;

pub use aggregator::FlowAggregator;
