pub mod cuts;
