pub mod audit_log;
pub mod claude_service;
pub mod file_service;
pub mod oracle_service;
pub mod plan_executor;
pub mod plan_parser;
pub mod prompt_service;
