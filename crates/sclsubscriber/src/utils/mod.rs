use crate::scl::{ElementId, SclDocument};

//存放一些辅助函数

/***************************************/
/***********  目录       Start ******************/
/***************************************/
/*1 属性比较函数     */
/*2 路径处理     */
/***************************************/
/*********** 目录        End ******************/
/***************************************/

/***************************************/
/***********1 属性比较函数          Start ******************/
/***************************************/

/* 同名属性比较 缺失的属性当作空字符串     */
pub fn same_attribute_value(
    doc: &SclDocument,
    left: Option<ElementId>,
    right: Option<ElementId>,
    attribute_name: &str,
) -> bool {
    same_attribute_value_diff_name(doc, left, attribute_name, right, attribute_name)
}

/* 不同名属性比较 比如 ExtRef srcLDInst 对 LDevice inst     */
pub fn same_attribute_value_diff_name(
    doc: &SclDocument,
    left: Option<ElementId>,
    left_attribute_name: &str,
    right: Option<ElementId>,
    right_attribute_name: &str,
) -> bool {
    let l = left.map(|e| doc.attr_or_empty(e, left_attribute_name)).unwrap_or("");
    let r = right.map(|e| doc.attr_or_empty(e, right_attribute_name)).unwrap_or("");
    l == r
}

/***************************************/
/***********1 属性比较函数          End ******************/
/***************************************/

/***************************************/
/***********2 路径处理          Start ******************/
/***************************************/

/* "Pos.general" -> ["Pos","general"]  空路径返回空     */
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.').collect()
}

/* 所属 IED 的名字     */
pub fn ied_name_of(doc: &SclDocument, element: ElementId) -> Option<&str> {
    doc.closest(element, &["IED"]).and_then(|ied| doc.attr(ied, "name"))
}

/***************************************/
/***********2 路径处理          End ******************/
/***************************************/
