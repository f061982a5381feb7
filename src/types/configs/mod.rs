pub mod frontier_config;
