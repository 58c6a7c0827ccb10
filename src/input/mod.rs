pub mod network;
pub mod parser_utils;
pub mod layout_parser;
pub mod query_parser;
