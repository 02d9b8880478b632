pub mod kv_store_db;
