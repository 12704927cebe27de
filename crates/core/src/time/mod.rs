pub mod cl_market;
