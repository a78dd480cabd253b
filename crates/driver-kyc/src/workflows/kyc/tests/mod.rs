mod common;

mod audit;
mod routing;
