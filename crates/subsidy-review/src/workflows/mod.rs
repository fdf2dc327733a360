pub mod subsidy;
