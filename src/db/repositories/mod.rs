mod nights;

pub(crate) use nights::load_all_nights;
