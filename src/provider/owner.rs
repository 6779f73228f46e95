use crate::dif::DifEntity;
use crate::reconcile::EntityAttribute;

pub const SERVICE_PREFIX: &str = "Service-";
pub const SERVICE_PARENT: &str = "service";

/// Link a freshly built entity to the service that owns it.
///
/// The service id is derived from the entity's own uid, so it is stable
/// across cycles. Called once, when the entity is created.
pub fn process_owner(entity: &mut DifEntity, attr: &EntityAttribute) {
    if attr.service.is_empty() {
        return;
    }
    let service_id = format!("{}{}", SERVICE_PREFIX, entity.uid);
    entity.part_of_entity(SERVICE_PARENT, service_id, attr.service.clone());
}
