pub mod kyc;
