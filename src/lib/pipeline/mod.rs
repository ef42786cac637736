pub mod readtype;
