pub mod mem_uri_set;
