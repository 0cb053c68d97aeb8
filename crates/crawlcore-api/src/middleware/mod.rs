pub mod request_validation;
