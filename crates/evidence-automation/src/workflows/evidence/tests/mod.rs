mod common;

mod routing;
mod transfer;
mod validation;
