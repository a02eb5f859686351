pub mod cache;
pub mod claude;
pub mod day;
pub mod jsonl;
pub mod labels;
pub mod parser;
pub mod pricing;
pub mod provider;
pub mod report;
pub mod scanner;
