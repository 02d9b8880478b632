pub mod configuration;
pub mod dal;
pub mod domain;
pub mod routes;
pub mod services;
pub mod startup;

#[cfg(test)]
mod test_support;
