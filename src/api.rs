use rocket::Route;

mod committee;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(voter::routes());
    routes.extend(committee::routes());
    routes
}
