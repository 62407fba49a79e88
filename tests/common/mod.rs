#![allow(dead_code)]

use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use mps_engine::ComplexScalar;

pub fn rng(seed: u64) -> StdRng { StdRng::seed_from_u64(seed) }

pub fn random_vector(len: usize, rng: &mut StdRng) -> nd::Array1<C64> {
    (0..len)
        .map(|_| C64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect()
}

pub fn distance<A>(a: &nd::Array1<A>, b: &nd::Array1<A>) -> f64
where A: ComplexScalar
{
    a.iter().zip(b.iter())
        .map(|(x, y)| (*x - *y).modulus_squared())
        .sum::<f64>()
        .sqrt()
}

pub fn norm<A>(a: &nd::Array1<A>) -> f64
where A: ComplexScalar
{
    a.iter().map(|x| x.modulus_squared()).sum::<f64>().sqrt()
}
