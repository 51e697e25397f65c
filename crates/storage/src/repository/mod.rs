mod rounds;

pub use rounds::RoundRepository;
