pub mod atomicity;
