pub mod pcal_nodes;
pub mod tla_expressions;
