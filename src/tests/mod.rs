pub mod fakes;

mod amount_tests;
